//! Site files: a schema, CSV-backed table data and view definitions in one
//! TOML document.
//!
//! ```toml
//! [[tables]]
//! name = "articles"
//! csv = "articles.csv"
//!
//! [[tables.fields]]
//! name = "id"
//! type = "integer"
//!
//! [[views]]
//! id = "articles"
//! base_table = "articles"
//!
//! [views.displays.page_1]
//! plugin = "page"
//! ```
//!
//! Relative `csv` paths resolve against the directory holding the site file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;
use crate::metadata::{MetadataCache, SchemaDescriber, StaticField, StaticSchema, StaticTable};
use crate::plugin::PluginRegistry;
use crate::query::{InMemoryBackend, LoadError};
use crate::view::{Engine, View};

/// One `[[tables]]` entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTable {
    /// Table name.
    pub name: String,
    /// CSV file holding the rows; the table is empty without one.
    #[serde(default)]
    pub csv: Option<PathBuf>,
    /// Field declarations.
    #[serde(default)]
    pub fields: Vec<StaticField>,
}

/// Parsed site file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteDefinition {
    /// Tables.
    #[serde(default)]
    pub tables: Vec<SiteTable>,
    /// Views.
    #[serde(default)]
    pub views: Vec<View>,
}

/// Failures loading a site.
#[derive(Debug, Error)]
pub enum SiteError {
    /// The site file could not be read.
    #[error("failed to read site {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The site file is not valid TOML for a site.
    #[error("failed to parse site {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A table's CSV data could not be loaded.
    #[error("failed to load table '{table}': {source}")]
    Load {
        table: String,
        #[source]
        source: LoadError,
    },
    /// Two views share an id.
    #[error("view '{0}' is defined more than once")]
    DuplicateView(String),
    /// No view has the requested id.
    #[error("site has no view '{0}'")]
    UnknownView(String),
}

impl SiteError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SiteError::Read { .. } => "SiteRead",
            SiteError::Parse { .. } => "SiteParse",
            SiteError::Load { .. } => "SiteLoad",
            SiteError::DuplicateView(_) => "DuplicateView",
            SiteError::UnknownView(_) => "UnknownView",
        }
    }
}

/// A loaded site: schema, populated backend and views by id.
#[derive(Debug)]
pub struct Site {
    /// Declared schema.
    pub schema: StaticSchema,
    /// Backend holding the CSV rows.
    pub backend: Arc<InMemoryBackend>,
    /// Views by id.
    pub views: BTreeMap<String, View>,
}

impl SiteDefinition {
    /// Parses site text.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Reads and parses a site file.
    pub fn read(path: &Path) -> Result<Self, SiteError> {
        let contents = fs::read_to_string(path).map_err(|source| SiteError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| SiteError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the schema, loads CSV data relative to `base_dir` and indexes
    /// the views.
    pub fn into_site(self, base_dir: &Path) -> Result<Site, SiteError> {
        let schema = StaticSchema {
            tables: self
                .tables
                .iter()
                .map(|table| StaticTable {
                    name: table.name.clone(),
                    fields: table.fields.clone(),
                })
                .collect(),
        };
        let backend = InMemoryBackend::new();
        for table in &self.tables {
            match &table.csv {
                Some(csv) => {
                    let path = base_dir.join(csv);
                    let fields = schema.describe_table(&table.name);
                    backend
                        .load_csv(&table.name, &path, &fields)
                        .map_err(|source| SiteError::Load {
                            table: table.name.clone(),
                            source,
                        })?;
                }
                None => backend.insert_table(table.name.clone(), Vec::new()),
            }
        }
        let mut views = BTreeMap::new();
        for view in self.views {
            let view = view.normalize();
            if views.contains_key(&view.id) {
                return Err(SiteError::DuplicateView(view.id));
            }
            views.insert(view.id.clone(), view);
        }
        info!(
            tables = schema.tables.len(),
            views = views.len(),
            "site.load"
        );
        Ok(Site {
            schema,
            backend: Arc::new(backend),
            views,
        })
    }
}

impl Site {
    /// Reads a site file and everything it references.
    pub fn load(path: &Path) -> Result<Self, SiteError> {
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        SiteDefinition::read(path)?.into_site(base_dir)
    }

    /// View `id`.
    pub fn view(&self, id: &str) -> Result<&View, SiteError> {
        self.views
            .get(id)
            .ok_or_else(|| SiteError::UnknownView(id.to_owned()))
    }

    /// An engine over this site's schema and data.
    pub fn engine(&self, registry: Arc<PluginRegistry>, config: EngineConfig) -> Engine {
        Engine::new(
            registry,
            Arc::new(MetadataCache::with_describer(self.schema.clone())),
            self.backend.clone(),
        )
        .with_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;

    const SITE: &str = r#"
        [[tables]]
        name = "articles"
        csv = "articles.csv"

        [[tables.fields]]
        name = "id"
        type = "integer"

        [[tables.fields]]
        name = "title"
        type = "string"
        title = "Title"

        [[tables]]
        name = "tags"

        [[views]]
        id = "articles"
        base_table = "articles"

        [views.displays.block_1]
        plugin = "block"

        [[views.displays.block_1.handlers]]
        type = "field"
        plugin = "standard"
        field = "articles.title"

        [[views.displays.block_1.handlers]]
        type = "sort"
        plugin = "standard"
        field = "articles.id"
        options = { order = "desc" }
    "#;

    #[test]
    fn loads_tables_and_views_relative_to_the_site_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("site.toml"), SITE).expect("site");
        fs::write(dir.path().join("articles.csv"), "id,title\n1,One\n2,Two\n").expect("csv");

        let site = Site::load(&dir.path().join("site.toml")).expect("load");
        assert_eq!(site.views.len(), 1);
        assert_eq!(site.view("articles").expect("view").displays["block_1"].id, "block_1");
        assert_eq!(site.view("missing").expect_err("missing").code(), "UnknownView");

        let registry = Arc::new(PluginRegistry::with_builtins());
        let engine = site.engine(registry, EngineConfig::default());
        let view = site.view("articles").expect("view");
        let rendered = engine
            .run(view, "block_1", &RequestContext::default())
            .expect("run");
        assert_eq!(rendered.rows, 2);
        let html = rendered.html();
        assert!(html.find("Two").expect("two") < html.find("One").expect("one"));
    }

    #[test]
    fn missing_csv_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("site.toml"), SITE).expect("site");
        let err = Site::load(&dir.path().join("site.toml")).expect_err("no csv");
        assert_eq!(err.code(), "SiteLoad");
    }

    #[test]
    fn duplicate_views_are_rejected() {
        let definition = SiteDefinition::from_toml(
            "[[views]]\nid = \"a\"\nbase_table = \"t\"\n\
             [[views]]\nid = \"a\"\nbase_table = \"t\"\n",
        )
        .expect("parse");
        let err = definition.into_site(Path::new(".")).expect_err("duplicate");
        assert_eq!(err.code(), "DuplicateView");
    }
}
