use std::path::Path;

/// Entity a log file belongs to, taken from a `<name>_<id>.<ext>` filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub id: String,
}

/// Splits the filename stem on its last `_`.
///
/// Returns `None` when the stem has no `_` or is not valid UTF-8.
pub fn entity_from_path(path: &Path) -> Option<Entity> {
    let stem = path.file_stem()?.to_str()?;
    let (name, id) = stem.rsplit_once('_')?;
    Some(Entity {
        name: name.to_string(),
        id: id.to_string(),
    })
}
