//! Signal path helpers.
//!
//! A signal path is a string `"<object_id>/<signal_id>"` where the object is
//! either a device or a physics model; the two namespaces are disjoint and
//! resolved by the caller.

/// Borrowed view of a parsed signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathParts<'a> {
    pub object_id: &'a str,
    pub signal_id: &'a str,
}

/// Split `"<object_id>/<signal_id>"` at the first slash.
///
/// Returns `None` when there is no slash or either side is empty.
pub fn split_path(path: &str) -> Option<PathParts<'_>> {
    let (object_id, signal_id) = path.split_once('/')?;
    if object_id.is_empty() || signal_id.is_empty() {
        return None;
    }
    Some(PathParts {
        object_id,
        signal_id,
    })
}

/// Join an object id and a signal id into a full path.
pub fn join_path(object_id: &str, signal_id: &str) -> String {
    format!("{object_id}/{signal_id}")
}
