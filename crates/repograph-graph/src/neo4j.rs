//! Neo4j backend speaking the HTTP transactional Cypher endpoint.
//!
//! Every trait call is one `POST /db/{db}/tx/commit` request, so all statements of a call run in
//! a single implicit transaction.

use std::time::Duration;

use repograph_index::{CodeNamespace, FileIr, SymbolIr};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{GraphError, Result};
use crate::model::{GraphCounts, RepoMeta, file_node_id, namespace_node_id};
use crate::store::{BoxFuture, GraphStore};

const SCHEMA: &[&str] = &[
    "CREATE CONSTRAINT repository_id IF NOT EXISTS FOR (r:Repository) REQUIRE r.id IS UNIQUE",
    "CREATE CONSTRAINT namespace_id IF NOT EXISTS FOR (n:Namespace) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT file_id IF NOT EXISTS FOR (f:File) REQUIRE f.id IS UNIQUE",
    "CREATE CONSTRAINT symbol_id IF NOT EXISTS FOR (s:Symbol) REQUIRE s.id IS UNIQUE",
];

const DELETE_SUBGRAPH: &[&str] = &[
    "MATCH (s:Symbol {repoId: $repoId}) DETACH DELETE s",
    "MATCH (f:File {repoId: $repoId}) DETACH DELETE f",
    "MATCH (n:Namespace {repoId: $repoId}) DETACH DELETE n",
];

const DELETE_REPOSITORY: &str = "MATCH (r:Repository {id: $repoId}) DETACH DELETE r";

const UPSERT_REPOSITORY: &str = "MERGE (r:Repository {id: $id}) \
     SET r.name = $name, r.url = $url, r.branch = $branch, \
         r.commitSha = $commitSha, r.indexedAt = $indexedAt";

const UPSERT_NAMESPACES: &str = "MATCH (r:Repository {id: $repoId}) \
     UNWIND $rows AS row \
     MERGE (n:Namespace {id: row.id}) \
     SET n.repoId = $repoId, n.name = row.name, n.rootPath = row.rootPath \
     MERGE (r)-[:HAS_NAMESPACE]->(n)";

const UPSERT_FILES: &str = "UNWIND $rows AS row \
     MATCH (n:Namespace {id: row.namespaceId}) \
     MERGE (f:File {id: row.id}) \
     SET f.repoId = $repoId, f.path = row.path, f.language = row.language, \
         f.contentHash = row.contentHash, f.namespace = row.namespace \
     MERGE (n)-[:CONTAINS]->(f)";

const UPSERT_SYMBOLS: &str = "UNWIND $rows AS row \
     MATCH (f:File {id: row.fileId}) \
     MERGE (s:Symbol {id: row.id}) \
     SET s.repoId = $repoId, s.name = row.name, s.kind = row.kind, \
         s.namespace = row.namespace, s.filePath = row.filePath, \
         s.startLine = row.startLine, s.endLine = row.endLine, s.signature = row.signature \
     MERGE (f)-[:DECLARES]->(s)";

const COUNTS: &str = "OPTIONAL MATCH (n:Namespace {repoId: $repoId}) WITH count(n) AS namespaces \
     OPTIONAL MATCH (f:File {repoId: $repoId}) WITH namespaces, count(f) AS files \
     OPTIONAL MATCH (s:Symbol {repoId: $repoId}) \
     RETURN namespaces, files, count(s) AS symbols";

#[derive(Serialize)]
struct Statement {
    statement: &'static str,
    parameters: Value,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

/// Connection settings for [`Neo4jGraphStore`].
#[derive(Clone)]
pub struct Neo4jConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Neo4jConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub struct Neo4jGraphStore {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for Neo4jGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jGraphStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Neo4jGraphStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Neo4jConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("repograph/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn commit(&self, statements: Vec<Statement>) -> Result<Vec<StatementResult>> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&json!({ "statements": statements }));
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Status {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        let body: CommitResponse = response.json().await?;
        if let Some(err) = body.errors.into_iter().next() {
            return Err(GraphError::Query {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.results)
    }

    async fn run_rows(
        &self,
        statement: &'static str,
        repo_id: &str,
        rows: Vec<Value>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.commit(vec![Statement {
            statement,
            parameters: json!({ "repoId": repo_id, "rows": rows }),
        }])
        .await?;
        Ok(())
    }
}

fn count_at(row: &[Value], idx: usize) -> Result<u64> {
    row.get(idx)
        .and_then(Value::as_u64)
        .ok_or_else(|| GraphError::Response(format!("missing count column {idx}")))
}

impl GraphStore for Neo4jGraphStore {
    fn ensure_schema(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let statements = SCHEMA
                .iter()
                .map(|s| Statement {
                    statement: *s,
                    parameters: json!({}),
                })
                .collect();
            self.commit(statements).await?;
            tracing::debug!(endpoint = %self.endpoint, "graph schema ensured");
            Ok(())
        })
    }

    fn delete_repo_subgraph(&self, repo_id: &str) -> BoxFuture<'_, Result<()>> {
        let params = json!({ "repoId": repo_id });
        Box::pin(async move {
            let statements = DELETE_SUBGRAPH
                .iter()
                .map(|s| Statement {
                    statement: *s,
                    parameters: params.clone(),
                })
                .collect();
            self.commit(statements).await?;
            Ok(())
        })
    }

    fn delete_repo_node(&self, repo_id: &str) -> BoxFuture<'_, Result<()>> {
        let params = json!({ "repoId": repo_id });
        Box::pin(async move {
            self.commit(vec![Statement {
                statement: DELETE_REPOSITORY,
                parameters: params,
            }])
            .await?;
            Ok(())
        })
    }

    fn upsert_repository(&self, meta: &RepoMeta) -> BoxFuture<'_, Result<()>> {
        let params = json!({
            "id": meta.id,
            "name": meta.name,
            "url": meta.url,
            "branch": meta.branch,
            "commitSha": meta.commit_sha,
            "indexedAt": meta.indexed_at.to_rfc3339(),
        });
        Box::pin(async move {
            self.commit(vec![Statement {
                statement: UPSERT_REPOSITORY,
                parameters: params,
            }])
            .await?;
            Ok(())
        })
    }

    fn upsert_namespaces(
        &self,
        repo_id: &str,
        namespaces: &[CodeNamespace],
    ) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let rows = namespaces
            .iter()
            .map(|ns| {
                json!({
                    "id": namespace_node_id(&repo_id, &ns.name),
                    "name": ns.name,
                    "rootPath": ns.root_path,
                })
            })
            .collect();
        Box::pin(async move { self.run_rows(UPSERT_NAMESPACES, &repo_id, rows).await })
    }

    fn upsert_files(&self, repo_id: &str, files: &[FileIr]) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let rows = files
            .iter()
            .map(|f| {
                json!({
                    "id": file_node_id(&repo_id, &f.path),
                    "namespaceId": namespace_node_id(&repo_id, &f.namespace),
                    "path": f.path,
                    "language": f.language.id(),
                    "contentHash": f.content_hash,
                    "namespace": f.namespace,
                })
            })
            .collect();
        Box::pin(async move { self.run_rows(UPSERT_FILES, &repo_id, rows).await })
    }

    fn upsert_symbols(&self, repo_id: &str, symbols: &[SymbolIr]) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let rows = symbols
            .iter()
            .map(|s| {
                json!({
                    "id": s.stable_id,
                    "fileId": file_node_id(&repo_id, &s.file_path),
                    "name": s.name,
                    "kind": s.kind.as_str(),
                    "namespace": s.namespace,
                    "filePath": s.file_path,
                    "startLine": s.start_line,
                    "endLine": s.end_line,
                    "signature": s.signature,
                })
            })
            .collect();
        Box::pin(async move { self.run_rows(UPSERT_SYMBOLS, &repo_id, rows).await })
    }

    fn counts(&self, repo_id: &str) -> BoxFuture<'_, Result<GraphCounts>> {
        let params = json!({ "repoId": repo_id });
        Box::pin(async move {
            let results = self
                .commit(vec![Statement {
                    statement: COUNTS,
                    parameters: params,
                }])
                .await?;
            let row = results
                .first()
                .and_then(|r| r.data.first())
                .ok_or_else(|| GraphError::Response("empty count result".into()))?;
            Ok(GraphCounts {
                namespaces: count_at(&row.row, 0)?,
                files: count_at(&row.row, 1)?,
                symbols: count_at(&row.row, 2)?,
            })
        })
    }
}
