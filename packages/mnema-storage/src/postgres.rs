use serde_json::{Map, Value};
use sqlx::{PgPool, QueryBuilder, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result,
	graph::{GraphStore, validate_label, validate_rel_type},
	models::{Direction, GraphNeighbor, GraphNode, NeighborQuery, NodeFilter},
	schema,
};

const SCHEMA_LOCK_ID: i64 = 6_366_563;

const NODE_COLUMNS: &str = "\
node_id,
	label,
	user_id,
	memory_type,
	hrid,
	anchor,
	tags,
	confidence,
	is_valid,
	supersedes,
	superseded_by,
	created_at,
	updated_at";

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &mnema_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		// Advisory locks are held per connection. Use a single transaction so
		// the lock is scoped to one connection and released when it ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in schema::render_schema().split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

/// Graph adapter over Postgres tables. Nodes and edges live in
/// `graph_nodes` / `graph_edges`; relationship constraints are enforced
/// by the edge foreign keys.
pub struct PgGraphStore {
	pub db: Db,
}
impl PgGraphStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl GraphStore for PgGraphStore {
	fn add_node<'a>(&'a self, label: &'a str, node: &'a GraphNode) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(label)?;

			sqlx::query(
				"\
INSERT INTO graph_nodes (
	node_id,
	label,
	user_id,
	memory_type,
	hrid,
	anchor,
	tags,
	confidence,
	is_valid,
	supersedes,
	superseded_by,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (node_id) DO UPDATE
SET
	hrid = EXCLUDED.hrid,
	anchor = EXCLUDED.anchor,
	tags = EXCLUDED.tags,
	confidence = EXCLUDED.confidence,
	is_valid = EXCLUDED.is_valid,
	supersedes = EXCLUDED.supersedes,
	superseded_by = EXCLUDED.superseded_by,
	updated_at = EXCLUDED.updated_at",
			)
			.bind(node.node_id)
			.bind(label)
			.bind(&node.user_id)
			.bind(&node.memory_type)
			.bind(&node.hrid)
			.bind(&node.anchor)
			.bind(&node.tags)
			.bind(node.confidence)
			.bind(node.is_valid)
			.bind(node.supersedes)
			.bind(node.superseded_by)
			.bind(node.created_at)
			.bind(node.updated_at)
			.execute(&self.db.pool)
			.await?;

			Ok(())
		})
	}

	fn add_relationship<'a>(
		&'a self,
		from_label: &'a str,
		to_label: &'a str,
		rel_type: &'a str,
		from_id: Uuid,
		to_id: Uuid,
		properties: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(from_label)?;
			validate_label(to_label)?;
			validate_rel_type(rel_type)?;

			let endpoints: Vec<(Uuid, String)> =
				sqlx::query_as("SELECT node_id, label FROM graph_nodes WHERE node_id = ANY($1)")
					.bind(vec![from_id, to_id])
					.fetch_all(&self.db.pool)
					.await?;
			let labeled = |id: Uuid, label: &str| {
				endpoints.iter().any(|(node_id, node_label)| *node_id == id && node_label == label)
			};

			if !labeled(from_id, from_label) {
				return Err(Error::NotFound(format!(
					"relationship source not found; label={from_label} node_id={from_id}"
				)));
			}
			if !labeled(to_id, to_label) {
				return Err(Error::NotFound(format!(
					"relationship target not found; label={to_label} node_id={to_id}"
				)));
			}

			let result = sqlx::query(
				"\
INSERT INTO graph_edges (edge_id, from_id, to_id, rel_type, properties, created_at)
VALUES ($1, $2, $3, $4, $5, now())
ON CONFLICT (from_id, to_id, rel_type) DO UPDATE
SET properties = EXCLUDED.properties",
			)
			.bind(Uuid::new_v4())
			.bind(from_id)
			.bind(to_id)
			.bind(rel_type)
			.bind(Value::Object(properties.clone()))
			.execute(&self.db.pool)
			.await;

			match result {
				Ok(_) => Ok(()),
				// Endpoint vanished between the check and the insert.
				Err(err) if is_foreign_key_violation(&err) => Err(Error::NotFound(format!(
					"relationship endpoint missing; from_id={from_id} to_id={to_id}"
				))),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn fetch_nodes<'a>(
		&'a self,
		label: &'a str,
		filter: &'a NodeFilter,
	) -> BoxFuture<'a, Result<Vec<GraphNode>>> {
		Box::pin(async move {
			validate_label(label)?;

			if filter.user_id.trim().is_empty() {
				return Err(Error::InvalidArgument(
					"node scans must be user-scoped; user_id must not be empty".to_string(),
				));
			}

			let mut builder = QueryBuilder::<sqlx::Postgres>::new(format!(
				"SELECT {NODE_COLUMNS} FROM graph_nodes WHERE label = "
			));

			builder.push_bind(label);
			builder.push(" AND user_id = ");
			builder.push_bind(&filter.user_id);

			if let Some(memory_type) = &filter.memory_type {
				builder.push(" AND memory_type = ");
				builder.push_bind(memory_type);
			}
			if let Some(since) = filter.since {
				builder.push(" AND updated_at >= ");
				builder.push_bind(since);
			}

			builder.push(" ORDER BY updated_at DESC, node_id ASC LIMIT ");
			builder.push_bind(filter.limit as i64);

			let rows: Vec<GraphNode> =
				builder.build_query_as().fetch_all(&self.db.pool).await?;

			Ok(rows)
		})
	}

	fn neighbors<'a>(
		&'a self,
		label: &'a str,
		node_id: Uuid,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, Result<Vec<GraphNeighbor>>> {
		Box::pin(async move {
			validate_label(label)?;

			if let Some(neighbor_label) = &query.neighbor_label {
				validate_label(neighbor_label)?;
			}
			if let Some(rel_types) = &query.rel_types {
				for rel_type in rel_types {
					validate_rel_type(rel_type)?;
				}
			}

			let mut builder = QueryBuilder::<sqlx::Postgres>::new(
				"\
SELECT DISTINCT ON (n.node_id)
	n.node_id,
	n.label,
	n.user_id,
	n.memory_type,
	n.hrid,
	n.anchor,
	n.tags,
	n.confidence,
	n.is_valid,
	n.supersedes,
	n.superseded_by,
	n.created_at,
	n.updated_at,
	e.rel_type
FROM graph_edges e
JOIN graph_nodes n ON ",
			);

			match query.direction {
				Direction::Out => {
					builder.push("e.from_id = ");
					builder.push_bind(node_id);
					builder.push(" AND n.node_id = e.to_id");
				},
				Direction::In => {
					builder.push("e.to_id = ");
					builder.push_bind(node_id);
					builder.push(" AND n.node_id = e.from_id");
				},
				Direction::Any => {
					builder.push("((e.from_id = ");
					builder.push_bind(node_id);
					builder.push(" AND n.node_id = e.to_id) OR (e.to_id = ");
					builder.push_bind(node_id);
					builder.push(" AND n.node_id = e.from_id))");
				},
			}

			builder.push(" WHERE n.node_id <> ");
			builder.push_bind(node_id);

			if let Some(rel_types) = &query.rel_types {
				builder.push(" AND e.rel_type = ANY(");
				builder.push_bind(rel_types.clone());
				builder.push(")");
			}
			if let Some(neighbor_label) = &query.neighbor_label {
				builder.push(" AND n.label = ");
				builder.push_bind(neighbor_label);
			}

			builder.push(" ORDER BY n.node_id, e.created_at ASC LIMIT ");
			builder.push_bind(query.limit as i64);

			let rows: Vec<GraphNeighbor> =
				builder.build_query_as().fetch_all(&self.db.pool).await?;

			Ok(rows)
		})
	}

	fn delete_node<'a>(&'a self, label: &'a str, node_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(label)?;

			let result = sqlx::query("DELETE FROM graph_nodes WHERE node_id = $1 AND label = $2")
				.bind(node_id)
				.bind(label)
				.execute(&self.db.pool)
				.await;

			match result {
				Ok(_) => Ok(()),
				Err(err) if is_foreign_key_violation(&err) => Err(Error::Conflict(format!(
					"node still has relationships; delete them first; label={label} node_id={node_id}"
				))),
				Err(err) => Err(err.into()),
			}
		})
	}
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
	err.as_database_error()
		.and_then(|db_err| db_err.code())
		.map(|code| code == "23503")
		.unwrap_or(false)
}
