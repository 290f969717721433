//! Engine registration from configuration.
//!
//! Datasets are parsed from N-Quads or N-Triples files. Program files are
//! handed to the store's [`ProgramCompiler`]; a store that cannot compile
//! them fails startup instead of running an experiment without them.

use std::path::{Path, PathBuf};

use bold_core::SimulationEngine;
use bold_core::config::{SimulationConfig, expand_paths};
use bold_store::codec::parse_statements;
use bold_store::{ProgramCompiler, RdfFormat};
use bold_types::{GraphName, Quad};
use tracing::info;

use crate::error::ServerBinError;

fn read(path: &Path) -> Result<String, ServerBinError> {
    std::fs::read_to_string(path).map_err(|source| ServerBinError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Parse one dataset file. `.nt` files are N-Triples, `.ttl` files
/// Turtle, everything else N-Quads; statements without a graph land in the
/// default graph.
pub fn load_dataset(path: &Path) -> Result<Vec<Quad>, ServerBinError> {
    let source = read(path)?;
    parse_statements(&source, RdfFormat::from_extension(path), &GraphName::Default).map_err(
        |source| ServerBinError::Dataset {
            path: path.to_path_buf(),
            source,
        },
    )
}

fn program_error(path: &Path) -> impl FnOnce(bold_store::ProgramError) -> ServerBinError + '_ {
    move |source| ServerBinError::Program {
        path: path.to_path_buf(),
        source,
    }
}

/// Register datasets, programs and the dump pattern from `config`, then
/// close registration.
pub async fn configure(
    engine: &SimulationEngine,
    compiler: &dyn ProgramCompiler,
    config: &SimulationConfig,
) -> Result<(), ServerBinError> {
    for path in expand_paths(&config.datasets)? {
        let quads = load_dataset(&path)?;
        info!(path = %path.display(), statements = quads.len(), "Dataset read");
        engine.register_dataset(&file_name(&path), quads).await?;
    }

    for path in expand_paths(&config.init_updates)? {
        let name = file_name(&path);
        let program = compiler
            .compile_update(&name, &read(&path)?)
            .map_err(program_error(&path))?;
        engine.register_single_update(&name, program).await?;
    }

    for path in expand_paths(&config.continuous_updates)? {
        let name = file_name(&path);
        let program = compiler
            .compile_update(&name, &read(&path)?)
            .map_err(program_error(&path))?;
        engine.register_continuous_update(&name, program).await?;
    }

    for path in expand_paths(&config.queries)? {
        let name = file_name(&path);
        let program = compiler
            .compile_query(&name, &read(&path)?)
            .map_err(program_error(&path))?;
        engine.register_query(&name, program).await?;
    }

    if let Some(path) = &config.termination_predicate {
        let predicate = compiler
            .compile_ask(&file_name(path), &read(path)?)
            .map_err(program_error(path))?;
        engine.set_termination_predicate(predicate).await?;
    }

    engine.set_dump_pattern(config.dump_pattern.clone()).await?;
    engine.registration_done().await?;
    Ok(())
}

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bold-config.yaml";

/// Config path from the command line, or the default file if it exists.
pub fn config_path(arg: Option<String>) -> Option<PathBuf> {
    arg.map(PathBuf::from).or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bold_core::EngineSettings;
    use bold_core::sink::MemorySinks;
    use bold_store::{GraphStore, MemoryStore};
    use bold_types::SimulationState;

    use super::*;

    fn engine(store: Arc<MemoryStore>) -> SimulationEngine {
        SimulationEngine::with_sinks(
            store as Arc<dyn GraphStore>,
            EngineSettings {
                base_uri: String::from("http://localhost:8080"),
                timeslot: Duration::from_millis(100),
                output_dir: PathBuf::from("unused"),
            },
            Arc::new(MemorySinks::new()),
        )
    }

    #[test]
    fn datasets_follow_the_file_extension() {
        let dir = tempfile::tempdir().unwrap();
        let nq = dir.path().join("a.nq");
        std::fs::write(&nq, "<http://ex.org/s> <http://ex.org/p> \"1\" <http://ex.org/g> .\n").unwrap();
        let nt = dir.path().join("b.nt");
        std::fs::write(&nt, "<http://ex.org/s> <http://ex.org/p> \"2\" .\n").unwrap();

        let quads = load_dataset(&nq).unwrap();
        assert_eq!(quads.len(), 1);
        assert!(quads.iter().all(|q| q.graph.iri() == Some("http://ex.org/g")));

        let quads = load_dataset(&nt).unwrap();
        assert!(quads.iter().all(|q| q.graph == GraphName::Default));

        let ttl = dir.path().join("d.ttl");
        std::fs::write(&ttl, "@prefix ex: <http://ex.org/> .\nex:s ex:p 1, 2 .\n").unwrap();
        let quads = load_dataset(&ttl).unwrap();
        assert_eq!(quads.len(), 2);
        assert!(quads.iter().all(|q| q.graph == GraphName::Default));

        let bad = dir.path().join("c.nt");
        std::fs::write(&bad, "<http://ex.org/s> <http://ex.org/p> \"3\" <http://ex.org/g> .\n").unwrap();
        assert!(matches!(load_dataset(&bad), Err(ServerBinError::Dataset { .. })));
    }

    #[tokio::test]
    async fn configure_registers_datasets_and_closes_registration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rooms.nq"),
            "<http://ex.org/room1> <http://ex.org/p> \"1\" <http://ex.org/rooms> .\n",
        )
        .unwrap();
        let config = SimulationConfig {
            datasets: vec![dir.path().to_path_buf()],
            ..SimulationConfig::default()
        };

        let store = Arc::new(MemoryStore::new());
        let engine = engine(Arc::clone(&store));
        configure(&engine, store.as_ref(), &config).await.unwrap();
        assert_eq!(engine.state(), SimulationState::Initializing);

        engine.start().await.unwrap();
        let summary = engine.wait_for_run().await.unwrap();
        assert_eq!(summary.replay.insertions, 3);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn program_files_need_a_compiling_store() {
        let dir = tempfile::tempdir().unwrap();
        let update = dir.path().join("tick.ru");
        std::fs::write(&update, "INSERT DATA {}").unwrap();
        let config = SimulationConfig {
            continuous_updates: vec![update],
            ..SimulationConfig::default()
        };

        let store = Arc::new(MemoryStore::new());
        let engine = engine(Arc::clone(&store));
        let err = configure(&engine, store.as_ref(), &config).await.unwrap_err();
        assert!(matches!(err, ServerBinError::Program { .. }));
        assert_eq!(engine.state(), SimulationState::Configured);
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(String::from("exp.yaml"))),
            Some(PathBuf::from("exp.yaml"))
        );
    }
}
