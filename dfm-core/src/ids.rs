use uuid::Uuid;

/// Namespace used to derive well-known node ids from stable names so a
/// client can identify terminal nodes (e.g. "all_done", "image") without
/// knowing the generated ids of the rest of the graph.
const WELL_KNOWN_NAMESPACE: Uuid = Uuid::from_bytes([
    0xdf, 0x3a, 0x11, 0x00, 0xc0, 0xde, 0x4f, 0x4d, 0xb0, 0x17, 0x00, 0x00, 0x5a, 0x11, 0x00, 0x01,
]);

/// Derive the stable node id for a well-known name.
///
/// This is the only place a `node_id` is computed from anything other than
/// a client-supplied random id — it must stay deterministic across
/// versions so that old clients referencing `"all_done"` keep working.
pub fn well_known_node_id(name: &str) -> Uuid {
    Uuid::new_v5(&WELL_KNOWN_NAMESPACE, name.as_bytes())
}

pub const ALL_DONE: &str = "all_done";
pub const IMAGE: &str = "image";
