/// Integration tests for the navigation facade as the CLI and the tool
/// server drive it: config → navigator → graph / index → rendered text.
use codecompass::config::{Config, GraphBackendKind};
use codecompass::db::{Direction, EdgeList, GraphStore, Relation, SqliteGraph, StructuralEdge};
use codecompass::error::NavError;
use codecompass::indexer::{ChunkKind, CodeChunk};
use codecompass::navigator::Navigator;
use codecompass::render;
use codecompass::search::{Bm25Params, ChunkIndex};
use std::fs;
use tempfile::{TempDir, tempdir};

fn workspace() -> (TempDir, Config) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.graph.db_path = dir.path().join("graph.db");
    config.index.path = dir.path().join("chunk_index.json");
    (dir, config)
}

fn seed_graph(config: &Config) {
    let edges = EdgeList::new(vec![
        StructuralEdge::new("api/routes.py", "services/auth.py", Relation::Imports),
        StructuralEdge::new("api/routes.py", "services/auth.py", Relation::Instantiates)
            .with_meta("calls AuthService()"),
        StructuralEdge::new("services/auth.py", "models/user.py", Relation::Imports),
        StructuralEdge::new("services/admin.py", "services/auth.py", Relation::Imports),
        StructuralEdge::new("services/admin.py", "services/auth.py", Relation::Inherits)
            .with_meta("AdminService inherits AuthService"),
    ]);
    let mut graph = SqliteGraph::open(&config.graph.db_path).unwrap();
    codecompass::db::load_with_fallback(&mut graph, edges.edges()).unwrap();
}

fn chunk(file: &str, kind: ChunkKind, name: &str, source: &str) -> CodeChunk {
    CodeChunk {
        file_path: file.into(),
        kind,
        name: name.into(),
        source: source.into(),
    }
}

#[test]
fn test_neighbors_through_config() {
    let (_dir, config) = workspace();
    seed_graph(&config);
    let nav = Navigator::from_config(&config);

    let both = nav.neighbors("services/auth.py", Direction::Both).unwrap();
    assert_eq!(both.len(), 5);
    assert!(both.iter().all(|n| n.direction != Direction::Both));

    let incoming = nav.neighbors("services/auth.py", Direction::In).unwrap();
    let outgoing = nav.neighbors("services/auth.py", Direction::Out).unwrap();
    assert_eq!(incoming.len() + outgoing.len(), both.len());
    assert_eq!(outgoing[0].neighbor, "models/user.py");

    let text = render::render_neighbors("services/auth.py", &both);
    assert!(text.contains("← [INHERITS]  services/admin.py"), "{text}");
    assert!(text.contains("→ [IMPORTS]  models/user.py"), "{text}");
    assert!(text.ends_with("Total: 5 structural connections"));
    nav.close().unwrap();
}

#[test]
fn test_stats_reflect_loaded_graph() {
    let (_dir, config) = workspace();
    let nav = Navigator::from_config(&config);
    let empty = nav.stats().unwrap();
    assert_eq!(empty.files, 0);
    assert!(empty.edges.is_empty());

    seed_graph(&config);
    nav.reload().unwrap();
    let stats = nav.stats().unwrap();
    assert_eq!(stats.files, 4);
    assert_eq!(stats.count_for(Relation::Imports), 3);
    assert_eq!(stats.edges[0].relation, "IMPORTS", "sorted by count descending");
    assert_eq!(stats.total_edges(), 5);
}

#[test]
fn test_search_through_config() {
    let (_dir, config) = workspace();
    ChunkIndex::build(
        std::path::Path::new("."),
        vec![
            chunk(
                "services/auth.py",
                ChunkKind::Class,
                "AuthService",
                "class AuthService:\n    def verify_token(self): ...",
            ),
            chunk(
                "services/auth.py",
                ChunkKind::Module,
                "auth",
                "import jwt\nclass AuthService: ...",
            ),
            chunk(
                "models/user.py",
                ChunkKind::Class,
                "User",
                "class User:\n    email: str",
            ),
            chunk(
                "api/routes.py",
                ChunkKind::Function,
                "login",
                "def login(req):\n    return AuthService().verify_token(req)",
            ),
        ],
        Bm25Params::default(),
    )
    .save(&config.index.path)
    .unwrap();

    let nav = Navigator::from_config(&config);
    let hits = nav.search("AuthService", 8).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].file, "services/auth.py");
    assert!(hits[0].score >= hits[1].score);

    let capped = nav.search("AuthService", 1).unwrap();
    assert_eq!(capped.len(), 1);

    assert!(nav.search("kubernetes", 8).unwrap().is_empty());
    let text = render::render_search("AuthService", &hits);
    assert!(text.starts_with("Top 2 files for 'AuthService':"), "{text}");
}

#[test]
fn test_boundary_failures_are_typed() {
    let (dir, mut config) = workspace();
    let nav = Navigator::from_config(&config);
    match nav.search("auth", 8) {
        Err(NavError::IndexNotFound { path, build_command }) => {
            assert_eq!(path, config.index.path);
            assert!(build_command.contains("codecompass index"));
        }
        other => panic!("expected IndexNotFound, got {other:?}"),
    }

    fs::write(&config.index.path, "[{\"file\": \"a.py\", \"text\": \"x\"}]").unwrap();
    let nav = Navigator::from_config(&config);
    assert!(matches!(nav.search("auth", 8), Err(NavError::IndexMalformed { .. })));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    config.graph.backend = GraphBackendKind::Falkor;
    config.graph.url = format!("falkor://127.0.0.1:{port}");
    config.graph.connect_timeout_ms = 500;
    let nav = Navigator::from_config(&config);
    let err = nav.stats().unwrap_err();
    assert!(matches!(err, NavError::DatastoreUnavailable { .. }));
    assert!(err.to_string().contains("docker run"));
    drop(dir);
}

#[test]
fn test_reload_picks_up_rebuilt_graph() {
    let (_dir, config) = workspace();
    seed_graph(&config);
    let nav = Navigator::from_config(&config);
    assert!(nav.neighbors("new.py", Direction::Both).unwrap().is_empty());

    {
        let mut graph = SqliteGraph::open(&config.graph.db_path).unwrap();
        graph.clear().unwrap();
        codecompass::db::load_with_fallback(
            &mut graph,
            &[StructuralEdge::new("new.py", "models/user.py", Relation::Imports)],
        )
        .unwrap();
    }
    nav.reload().unwrap();
    let rows = nav.neighbors("new.py", Direction::Out).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(nav.stats().unwrap().files, 2);
}
