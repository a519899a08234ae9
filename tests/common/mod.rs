#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fdep_mcp::config::ServerConfig;
use fdep_mcp::db::Database;
use fdep_mcp::service::CodeService;
use tempfile::TempDir;

/// Ids of the seeded entities.
pub struct Seeded {
    pub parser: i64,
    pub lexer: i64,
    pub main_mod: i64,
    pub parse_expr: i64,
    pub parse_term: i64,
    pub tokenize: i64,
    pub main_fn: i64,
    pub reparse: i64,
    pub expr: i64,
    pub term: i64,
    pub token: i64,
}

/// Populates `db` with a small three-module codebase.
///
/// Calls: parseExpr -> parseTerm -> parseExpr (cycle), parseExpr -> tokenize,
/// main -> parseExpr, main -> System.IO.putStrLn (not stored).
/// Types: Expr -> Term -> Expr (cycle), Expr -> Token.
pub fn seed(db: &Database) -> Seeded {
    let parser = db.insert_module("App.Parser", Some("src/App/Parser.hs")).unwrap();
    let lexer = db.insert_module("App.Lexer", Some("src/App/Lexer.hs")).unwrap();
    let main_mod = db.insert_module("App.Main", Some("app/Main.hs")).unwrap();

    let parse_expr = db
        .insert_function(parser, "parseExpr", Some("Config -> ParseState -> Either Error Exprs"))
        .unwrap();
    let parse_term = db
        .insert_function(parser, "parseTerm", Some("ParseState -> Either Error Term"))
        .unwrap();
    let tokenize = db.insert_function(lexer, "tokenize", Some("Text -> [Token]")).unwrap();
    let main_fn = db.insert_function(main_mod, "main", Some("IO ()")).unwrap();
    let reparse = db.insert_function(parser, "reparse", None).unwrap();

    db.insert_call(parse_expr, "parseTerm", Some("App.Parser")).unwrap();
    db.insert_call(parse_term, "parseExpr", Some("App.Parser")).unwrap();
    db.insert_call(parse_expr, "tokenize", Some("App.Lexer")).unwrap();
    db.insert_call(main_fn, "parseExpr", Some("App.Parser")).unwrap();
    db.insert_call(main_fn, "putStrLn", Some("System.IO")).unwrap();
    db.insert_where_function(parse_expr, "go").unwrap();

    let expr = db
        .insert_type(parser, "Expr", Some("DATA"), Some("data Expr = Add Expr Expr | Lit Term"))
        .unwrap();
    let term = db.insert_type(parser, "Term", Some("DATA"), Some("data Term = Paren Expr")).unwrap();
    let token = db.insert_type(lexer, "Token", Some("SUMTYPE"), None).unwrap();
    let add = db.insert_constructor(expr, "Add").unwrap();
    db.insert_field(add, None, Some("Expr")).unwrap();
    db.insert_field(add, None, Some("Expr")).unwrap();
    db.insert_constructor(expr, "Lit").unwrap();
    db.insert_type_dependency(expr, term).unwrap();
    db.insert_type_dependency(term, expr).unwrap();
    db.insert_type_dependency(expr, token).unwrap();

    db.insert_class(parser, "Pretty", Some("class Pretty a where pretty :: a -> Text"))
        .unwrap();
    db.insert_import(main_mod, "App.Parser", Some("app"), true).unwrap();
    db.insert_import(parser, "App.Lexer", Some("app"), false).unwrap();
    db.insert_instance(parser, "instance Pretty Expr", Some("Pretty Expr")).unwrap();

    Seeded {
        parser,
        lexer,
        main_mod,
        parse_expr,
        parse_term,
        tokenize,
        main_fn,
        reparse,
        expr,
        term,
        token,
    }
}

/// Creates and seeds a database file inside a fresh temp dir.
pub fn seeded_db_file() -> (PathBuf, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("fdep.db");
    let db = Database::initialize(&db_path).expect("failed to initialize database");
    seed(&db);
    db.close();
    (db_path, dir)
}

pub fn config_for(db_path: &Path) -> ServerConfig {
    ServerConfig {
        db_path: db_path.to_path_buf(),
        ..Default::default()
    }
}

/// An initialized service over a seeded database.
pub fn seeded_service() -> (CodeService, TempDir) {
    let (db_path, dir) = seeded_db_file();
    let mut service = CodeService::new(config_for(&db_path));
    service.initialize().expect("failed to open seeded database");
    (service, dir)
}
