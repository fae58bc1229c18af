/// Graph-store DDL. Edges reference nodes with plain foreign keys; a
/// delete blocked by the constraint is how "node still has relationships"
/// surfaces (see `postgres::PgGraphStore::delete_node`).
pub fn render_schema() -> &'static str {
	include_str!("../../../sql/init.sql")
}
