//! Neo4j connection management and shared graph client.

use neo4rs::{query, ConfigBuilder, Graph, Query};

use ipam_core::StoreError;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} with {key} {value}")]
    NotFound {
        label: String,
        key: String,
        value: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<GraphError> for StoreError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Connection(msg) => StoreError::Connection(msg),
            GraphError::Query(e) => StoreError::Query(e.to_string()),
            GraphError::NotFound { label, value, .. } if label == "Range" => {
                StoreError::RangeNotFound(value)
            }
            GraphError::NotFound { value, .. } => StoreError::HostNotFound(value),
            GraphError::Serialization(msg) => StoreError::Corrupt(msg),
        }
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "ipam-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the uniqueness constraints the inventory relies on.
    ///
    /// `Host.address` uniqueness is what makes concurrent MERGEs of the same
    /// address collapse into one record.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in [
            "CREATE CONSTRAINT host_address IF NOT EXISTS
             FOR (h:Host) REQUIRE h.address IS UNIQUE",
            "CREATE CONSTRAINT range_id IF NOT EXISTS
             FOR (r:Range) REQUIRE r.id IS UNIQUE",
            "CREATE CONSTRAINT setting_key IF NOT EXISTS
             FOR (s:Setting) REQUIRE s.key IS UNIQUE",
        ] {
            self.run(query(statement)).await?;
        }
        Ok(())
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }
}
