//! FalkorDB backend: Cypher over the Redis protocol (`GRAPH.QUERY`).
//!
//! The wire layer is small enough to speak directly: commands go out as
//! arrays of bulk strings, replies are decoded into [`Reply`] trees, and
//! result sets are requested in `--compact` form.
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::models::{
    Direction, GraphStats, Neighbor, Relation, RelationCount, StructuralEdge, sort_neighbors,
};
use super::{GraphStore, LOAD_BATCH_SIZE, LoadStrategy, LoadSummary};
use crate::config::GraphConfig;
use crate::error::{NavError, Result};

const IO_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PORT: u16 = 6379;

// ============================================================================
// Endpoint
// ============================================================================

/// Host, port and credentials parsed from `graph.url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoint {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl GraphEndpoint {
    /// Accepts `falkor://[user[:password]@]host[:port][/db]`, the same with
    /// `redis://`, or a bare `host[:port]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid =
            |why: &str| NavError::InvalidArgument(format!("invalid graph url '{raw}': {why}"));

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NavError::InvalidArgument("empty graph url".to_string()));
        }
        let rest = ["falkor://", "redis://"]
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(*scheme))
            .unwrap_or(trimmed);
        let authority = rest.split_once('/').map_or(rest, |(authority, _)| authority);
        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((info, host_port)) => (Some(info), host_port),
            None => (None, authority),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| invalid("port must be a number between 0 and 65535"))?;
                (host.trim(), port)
            }
            None => (host_port.trim(), DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let (user, password) = match userinfo.map(|info| info.split_once(':')) {
            None => (None, None),
            Some(Some((user, password))) => (non_empty(user), non_empty(password)),
            Some(None) => (userinfo.and_then(non_empty), None),
        };
        Ok(Self {
            host: host.to_string(),
            port,
            user,
            password,
        })
    }

    /// `graph.user` / `graph.password` replace whatever the URL carried.
    fn with_config_credentials(mut self, config: &GraphConfig) -> Self {
        if let Some(user) = config.user.as_deref().and_then(non_empty) {
            self.user = Some(user);
        }
        if let Some(password) = config.password.as_deref().and_then(non_empty) {
            self.password = Some(password);
        }
        self
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ============================================================================
// Wire protocol
// ============================================================================

/// One decoded protocol reply. Nil bulk strings and nil arrays both map to `Nil`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Status(String),
    Error(String),
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Reply>),
    Nil,
}

impl Reply {
    fn text(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bytes(b) => String::from_utf8(b.clone()).ok(),
            Reply::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn int(&self) -> Option<i64> {
        match self {
            Reply::Int(n) => Some(*n),
            _ => self.text()?.trim().parse().ok(),
        }
    }
}

fn malformed(what: impl std::fmt::Display) -> NavError {
    NavError::Query(format!("malformed reply from graph server: {what}"))
}

pub(crate) fn write_command<W: Write>(out: &mut W, args: &[&str]) -> std::io::Result<()> {
    write!(out, "*{}\r\n", args.len())?;
    for arg in args {
        write!(out, "${}\r\n", arg.len())?;
        out.write_all(arg.as_bytes())?;
        out.write_all(b"\r\n")?;
    }
    Ok(())
}

/// Reads one complete reply. I/O failures (including a closed socket) come
/// back as [`NavError::Io`], framing problems as [`NavError::Query`].
pub(crate) fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let header = read_header(reader)?;
    let mut chars = header.chars();
    let kind = chars.next();
    let body = chars.as_str();

    match kind {
        Some('+') => Ok(Reply::Status(body.to_string())),
        Some('-') => Ok(Reply::Error(body.to_string())),
        Some(':') => Ok(Reply::Int(parse_number(body)?)),
        Some('$') => match usize::try_from(parse_number(body)?) {
            Err(_) => Ok(Reply::Nil),
            Ok(len) => {
                let mut buf = vec![0u8; len + 2];
                reader.read_exact(&mut buf)?;
                if !buf.ends_with(b"\r\n") {
                    return Err(malformed("bulk string not terminated by CRLF"));
                }
                buf.truncate(len);
                Ok(Reply::Bytes(buf))
            }
        },
        Some('*') => match usize::try_from(parse_number(body)?) {
            Err(_) => Ok(Reply::Nil),
            Ok(count) => (0..count)
                .map(|_| read_reply(reader))
                .collect::<Result<Vec<_>>>()
                .map(Reply::List),
        },
        _ => Err(malformed(format_args!("unknown reply type in '{header}'"))),
    }
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    let Some(body) = line.strip_suffix(b"\r\n") else {
        return Err(malformed("line not terminated by CRLF"));
    };
    String::from_utf8(body.to_vec()).map_err(malformed)
}

fn parse_number(body: &str) -> Result<i64> {
    body.parse()
        .map_err(|e| malformed(format_args!("bad number '{body}': {e}")))
}

/// One TCP connection; replies are read through the buffer, commands are
/// written to the socket underneath it.
struct Connection {
    stream: BufReader<TcpStream>,
}

impl Connection {
    fn open(address: &str, timeout: Duration) -> std::io::Result<Self> {
        let target = address.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for '{address}'"),
            )
        })?;
        let stream = TcpStream::connect_timeout(&target, timeout)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    fn call(&mut self, args: &[&str]) -> Result<Reply> {
        let mut frame = Vec::new();
        write_command(&mut frame, args)?;
        self.stream.get_mut().write_all(&frame)?;
        read_reply(&mut self.stream)
    }
}

// ============================================================================
// Cypher
// ============================================================================

pub(crate) fn cypher_string_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn edges_literal(edges: &[&StructuralEdge]) -> String {
    let items: Vec<String> = edges
        .iter()
        .map(|e| {
            format!(
                "{{source: {}, target: {}, relation: {}}}",
                cypher_string_literal(&e.source),
                cypher_string_literal(&e.target),
                cypher_string_literal(e.relation.as_str())
            )
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn merge_endpoints(edges: &[&StructuralEdge]) -> String {
    format!(
        "UNWIND {} AS edge \
         MERGE (a:File {{path: edge.source}}) MERGE (b:File {{path: edge.target}})",
        edges_literal(edges)
    )
}

/// One statement merging every relation type in the batch.
pub(crate) fn generic_merge_query(edges: &[&StructuralEdge]) -> String {
    let mut query = merge_endpoints(edges);
    for relation in Relation::ALL {
        query.push_str(&format!(
            " FOREACH (_ IN CASE WHEN edge.relation = '{rel}' THEN [1] ELSE [] END \
             | MERGE (a)-[:{rel}]->(b))",
            rel = relation.as_str()
        ));
    }
    query
}

/// One statement for a single relation type.
pub(crate) fn relation_merge_query(relation: Relation, edges: &[&StructuralEdge]) -> String {
    format!(
        "{} MERGE (a)-[:{}]->(b)",
        merge_endpoints(edges),
        relation.as_str()
    )
}

/// Servers without conditional `FOREACH` reject the generic merge outright.
fn generic_merge_rejected(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["foreach", "not supported", "unsupported"]
        .iter()
        .any(|needle| lower.contains(needle))
}

// ============================================================================
// Result sets
// ============================================================================

/// Data rows of a compact result set (`[header, rows, statistics]`).
/// Write-only statements reply with statistics alone.
pub(crate) fn result_rows(reply: Reply) -> Result<Vec<Vec<Reply>>> {
    let Reply::List(sections) = reply else {
        return Err(malformed("GRAPH.QUERY reply is not a list"));
    };
    if sections.len() < 2 {
        return Ok(Vec::new());
    }
    let Some(Reply::List(rows)) = sections.into_iter().nth(1) else {
        return Ok(Vec::new());
    };
    Ok(rows
        .into_iter()
        .filter_map(|row| match row {
            Reply::List(cells) => Some(cells),
            _ => None,
        })
        .collect())
}

/// Compact cells are `[type tag, value]` pairs.
fn cell(row: &[Reply], column: usize) -> Option<&Reply> {
    match row.get(column)? {
        Reply::List(pair) if pair.len() == 2 => pair.get(1),
        _ => None,
    }
}

fn cell_text(row: &[Reply], column: usize) -> Option<String> {
    cell(row, column)?.text()
}

fn cell_int(row: &[Reply], column: usize) -> Option<i64> {
    cell(row, column)?.int()
}

fn unavailable(address: &str, reason: impl std::fmt::Display, remediation: &str) -> NavError {
    NavError::DatastoreUnavailable {
        endpoint: address.to_string(),
        reason: reason.to_string(),
        remediation: remediation.to_string(),
    }
}

// ============================================================================
// Store
// ============================================================================

/// Networked property graph reachable over the Redis protocol.
pub struct FalkorGraph {
    conn: Option<Connection>,
    graph: String,
    address: String,
}

impl FalkorGraph {
    pub fn connect(config: &GraphConfig) -> Result<Self> {
        let endpoint = GraphEndpoint::parse(&config.url)?.with_config_credentials(config);
        let address = endpoint.address();
        let timeout = Duration::from_millis(config.connect_timeout_ms.max(1));

        let mut conn = Connection::open(&address, timeout).map_err(|e| {
            unavailable(
                &address,
                e,
                "Is FalkorDB running? Try: docker run -p 6379:6379 falkordb/falkordb \
                 (or set CODECOMPASS_GRAPH_URL)",
            )
        })?;

        if let Some(password) = endpoint.password.as_deref() {
            let mut auth = vec!["AUTH"];
            auth.extend(endpoint.user.as_deref());
            auth.push(password);
            let failure = match conn.call(&auth) {
                Ok(Reply::Error(reason)) => Some(reason),
                Err(e) => Some(e.to_string()),
                Ok(_) => None,
            };
            if let Some(reason) = failure {
                return Err(unavailable(
                    &address,
                    format_args!("authentication failed: {reason}"),
                    "Check the credentials in the graph url or \
                     CODECOMPASS_GRAPH_USER / CODECOMPASS_GRAPH_PASSWORD.",
                ));
            }
        } else if endpoint.user.is_some() {
            debug!("Graph user given without a password; skipping AUTH");
        }

        info!(
            "Connected to FalkorDB at {address} (graph '{}')",
            config.graph_name
        );
        let mut graph = Self {
            conn: Some(conn),
            graph: config.graph_name.clone(),
            address,
        };
        // Fails harmlessly when the index already exists.
        if let Err(e) = graph.query("CREATE INDEX FOR (f:File) ON (f.path)") {
            debug!("File.path index not created: {e}");
        }
        Ok(graph)
    }

    fn query(&mut self, cypher: &str) -> Result<Reply> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(unavailable(
                &self.address,
                "connection closed",
                "Reopen the graph store.",
            ));
        };
        match conn.call(&["GRAPH.QUERY", self.graph.as_str(), cypher, "--compact"]) {
            Ok(Reply::Error(msg)) => Err(NavError::Query(msg)),
            Ok(reply) => Ok(reply),
            Err(NavError::Io(e)) => {
                // The stream may be mid-reply; never reuse it.
                self.conn = None;
                Err(unavailable(&self.address, e, "Is FalkorDB still running?"))
            }
            Err(e) => Err(e),
        }
    }

    fn rows(&mut self, cypher: &str) -> Result<Vec<Vec<Reply>>> {
        result_rows(self.query(cypher)?)
    }

    fn directional(&mut self, cypher: &str, direction: Direction) -> Result<Vec<Neighbor>> {
        let mut out = Vec::new();
        for row in self.rows(cypher)? {
            let (Some(neighbor), Some(relation)) = (cell_text(&row, 0), cell_text(&row, 1)) else {
                continue;
            };
            out.push(Neighbor {
                neighbor,
                relation: relation.parse()?,
                direction,
            });
        }
        Ok(out)
    }
}

impl GraphStore for FalkorGraph {
    fn backend_name(&self) -> &'static str {
        "falkordb"
    }

    fn clear(&mut self) -> Result<()> {
        self.query("MATCH (n) DETACH DELETE n")?;
        info!("Graph cleared");
        Ok(())
    }

    fn load_edges(
        &mut self,
        edges: &[StructuralEdge],
        strategy: LoadStrategy,
    ) -> Result<LoadSummary> {
        let valid: Vec<&StructuralEdge> = edges.iter().filter(|e| !e.is_self_edge()).collect();
        match strategy {
            LoadStrategy::Generic => {
                for batch in valid.chunks(LOAD_BATCH_SIZE) {
                    match self.query(&generic_merge_query(batch)) {
                        Err(NavError::Query(msg)) if generic_merge_rejected(&msg) => {
                            return Err(NavError::Unsupported(format!(
                                "generic relationship merge ({msg})"
                            )));
                        }
                        other => {
                            other?;
                        }
                    }
                }
            }
            LoadStrategy::PerRelation => {
                for relation in Relation::ALL {
                    let of_kind: Vec<&StructuralEdge> = valid
                        .iter()
                        .copied()
                        .filter(|e| e.relation == relation)
                        .collect();
                    for batch in of_kind.chunks(LOAD_BATCH_SIZE) {
                        self.query(&relation_merge_query(relation, batch))?;
                    }
                    if !of_kind.is_empty() {
                        debug!("Loaded {} {} edges", of_kind.len(), relation);
                    }
                }
            }
        }
        info!(
            "Loaded {} edges into FalkorDB graph '{}'",
            edges.len(),
            self.graph
        );
        Ok(LoadSummary {
            submitted: edges.len(),
            strategy,
        })
    }

    fn neighbors(&mut self, path: &str, direction: Direction) -> Result<Vec<Neighbor>> {
        let file = cypher_string_literal(path);
        let mut rows = Vec::new();
        if direction.includes(Direction::Out) {
            let q = format!("MATCH (f:File {{path: {file}}})-[r]->(n:File) RETURN n.path, type(r)");
            rows.extend(self.directional(&q, Direction::Out)?);
        }
        if direction.includes(Direction::In) {
            let q = format!("MATCH (f:File {{path: {file}}})<-[r]-(n:File) RETURN n.path, type(r)");
            rows.extend(self.directional(&q, Direction::In)?);
        }
        sort_neighbors(&mut rows);
        Ok(rows)
    }

    fn stats(&mut self) -> Result<GraphStats> {
        let files = self
            .rows("MATCH (f:File) RETURN count(f)")?
            .first()
            .and_then(|row| cell_int(row, 0))
            .unwrap_or(0);

        let mut edges = Vec::new();
        for row in self.rows("MATCH ()-[r]->() RETURN type(r), count(r)")? {
            let (Some(relation), Some(count)) = (cell_text(&row, 0), cell_int(&row, 1)) else {
                continue;
            };
            edges.push(RelationCount {
                relation,
                count: count.max(0) as u64,
            });
        }
        Ok(GraphStats::new(files.max(0) as u64, edges))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.call(&["QUIT"]) {
                warn!("FalkorDB QUIT failed: {e}");
            }
        }
        Ok(())
    }
}
