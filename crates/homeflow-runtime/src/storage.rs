use homeflow_core::{FlowDesc, FlowError, Result, ROOT_SYMBOL};
use std::path::{Path, PathBuf};

/// Source assigned to flows compiled into the binary
pub const EMBEDDED_SOURCE: &str = "embedded";

const EMBEDDED_FLOWS: &[(&str, &str)] = &[
    ("ping", include_str!("../embedded_flows/ping.json")),
    ("metrics", include_str!("../embedded_flows/metrics.json")),
];

/// Flow ids double as file names and as step names in composite flows, so
/// they must be non-empty, free of path separators and not `_`
pub fn validate_flow_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id == "."
        || id == ".."
        || id == ROOT_SYMBOL
    {
        return Err(FlowError::InvalidFlowId(id.to_string()));
    }
    Ok(())
}

/// Flows shipped with the engine, marked with the `embedded` source
pub fn embedded_flows() -> Vec<(String, FlowDesc)> {
    EMBEDDED_FLOWS
        .iter()
        .filter_map(|(id, json)| match serde_json::from_str::<FlowDesc>(json) {
            Ok(desc) => Some((id.to_string(), desc.with_source(EMBEDDED_SOURCE))),
            Err(e) => {
                tracing::error!("Embedded flow \"{}\" is invalid: {}", id, e);
                None
            }
        })
        .collect()
}

/// Directory of persisted flows, one `<id>.json` file per flow
#[derive(Debug, Clone)]
pub struct FlowStore {
    dir: PathBuf,
}

impl FlowStore {
    /// Opens the store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| FlowError::Storage {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_flow_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    pub fn write(&self, id: &str, desc: &FlowDesc) -> Result<()> {
        let path = self.path_for(id)?;
        let json = serde_json::to_string_pretty(desc)?;
        std::fs::write(&path, json).map_err(|source| FlowError::Storage {
            path: path.display().to_string(),
            source,
        })
    }

    /// Removes the file of a flow; a missing file is not an error
    pub fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FlowError::Storage {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Reads every stored flow, sorted by id. Unreadable files are skipped.
    pub fn load_all(&self) -> Result<Vec<(String, FlowDesc)>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| FlowError::Storage {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut flows = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let desc = std::fs::read_to_string(&path)
                .map_err(FlowError::from)
                .and_then(|content| serde_json::from_str::<FlowDesc>(&content).map_err(FlowError::from));
            match desc {
                Ok(mut desc) => {
                    desc.id = id.clone();
                    flows.push((id, desc));
                }
                Err(e) => tracing::warn!("Could not load stored flow {}: {}", path.display(), e),
            }
        }
        flows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeflow_core::StepDesc;

    #[test]
    fn rejects_path_like_ids() {
        for id in ["", "a/b", "a\\b", "..", "_"] {
            assert!(validate_flow_id(id).is_err(), "{:?}", id);
        }
        assert!(validate_flow_id("living-room.lights").is_ok());
    }

    #[test]
    fn embedded_flows_parse() {
        let flows = embedded_flows();
        assert_eq!(flows.len(), EMBEDDED_FLOWS.len());
        assert!(flows.iter().all(|(_, d)| d.source == EMBEDDED_SOURCE));
    }

    #[test]
    fn ignores_non_json_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path()).unwrap();
        store
            .write("good", &FlowDesc::new(vec![StepDesc::new("system", "noop")]))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let flows = store.load_all().unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].0, "good");
        assert_eq!(flows[0].1.id, "good");

        store.remove("good").unwrap();
        store.remove("good").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
