//! Constants shared across the crate.

/// Name of the collection holding every map entry.
pub const ALL_COLLECTION: &str = "all";

/// Root key under which collections are exposed to templates.
pub const COLLECTIONS_KEY: &str = "collections";

/// Upper bound on layout chain length.
///
/// Repeated keys are caught earlier; this bounds chains that never repeat a
/// key but keep producing new ones.
pub const MAX_LAYOUT_DEPTH: usize = 64;

/// Config file looked up in the input directory.
pub const CONFIG_FILE_NAME: &str = "sitegraph.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "SITEGRAPH_CONFIG";

/// Name given to the single compiled template inside a [`tera::Tera`] instance.
pub const COMPILED_TEMPLATE_NAME: &str = "__sitegraph_compiled";
