//! Fitness sinks: where evaluated individuals and archive snapshots go.
//!
//! Sinks are for inspection only. A failing sink logs and carries on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::schema::{GenerationSnapshot, IndividualRecord};

/// Receiver of per-individual fitness and per-generation archives.
pub trait FitnessSink: Send {
    fn record_individual(&mut self, record: &IndividualRecord);
    fn record_generation(&mut self, snapshot: &GenerationSnapshot);
}

/// Sink that writes everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FitnessSink for LogSink {
    fn record_individual(&mut self, record: &IndividualRecord) {
        match record.fitness {
            Some(f) => log::debug!(
                "{} {} ({} npcs): distance {:.2}, smoothness {:.3}, diversity {:.3}, crossing {:.2}, interaction {:.3}",
                record.species.label(),
                record.id,
                record.genes.len(),
                f.min_distance(),
                f.smoothness(),
                f.diversity(),
                f.crossing_time(),
                f.interaction()
            ),
            None => log::debug!("{} {} not evaluated", record.species.label(), record.id),
        }
    }

    fn record_generation(&mut self, snapshot: &GenerationSnapshot) {
        log::info!(
            "Generation {}: {} evaluations, archive sizes walker={} vehicle={}",
            snapshot.generation,
            snapshot.evaluations,
            snapshot.walker_archive.members.len(),
            snapshot.vehicle_archive.members.len()
        );
    }
}

/// Sink that writes JSON files into a directory.
///
/// Each generation lands in `generation_{n}.json`; individuals are appended
/// as JSON lines to `individuals.jsonl`.
#[derive(Debug)]
pub struct JsonDirSink {
    dir: PathBuf,
    individuals: BufWriter<File>,
}

impl JsonDirSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("individuals.jsonl"))?;
        Ok(Self {
            dir,
            individuals: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for a generation.
    pub fn generation_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("generation_{generation}.json"))
    }

    fn write_individual(&mut self, record: &IndividualRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.individuals, record)?;
        self.individuals.write_all(b"\n")
    }

    fn write_generation(&mut self, snapshot: &GenerationSnapshot) -> io::Result<PathBuf> {
        self.individuals.flush()?;
        let path = self.generation_path(snapshot.generation);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl FitnessSink for JsonDirSink {
    fn record_individual(&mut self, record: &IndividualRecord) {
        if let Err(e) = self.write_individual(record) {
            log::warn!("Failed to write individual {}: {e}", record.id);
        }
    }

    fn record_generation(&mut self, snapshot: &GenerationSnapshot) {
        match self.write_generation(snapshot) {
            Ok(path) => log::info!("Saved generation {} to {}", snapshot.generation, path.display()),
            Err(e) => log::warn!("Failed to save generation {}: {e}", snapshot.generation),
        }
    }
}

/// Read a generation snapshot written by [`JsonDirSink`].
pub fn load_generation<P: AsRef<Path>>(path: P) -> io::Result<GenerationSnapshot> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArchiveSnapshot, FitnessVector, Species};
    use tempfile::tempdir;

    fn record(id: &str) -> IndividualRecord {
        IndividualRecord {
            id: id.to_string(),
            species: Species::Vehicle,
            generation: 1,
            genes: Vec::new(),
            fitness: Some(FitnessVector::new(3.0, -0.5, -0.2, 0.0, 0.9)),
        }
    }

    fn snapshot(generation: usize) -> GenerationSnapshot {
        GenerationSnapshot {
            generation,
            walker_archive: ArchiveSnapshot {
                species: Species::Walker,
                members: Vec::new(),
            },
            vehicle_archive: ArchiveSnapshot {
                species: Species::Vehicle,
                members: vec![record("g1_0")],
            },
            evaluations: 4,
        }
    }

    #[test]
    fn test_json_dir_sink_roundtrip() {
        let dir = tempdir().unwrap();
        let mut sink = JsonDirSink::new(dir.path().join("out")).unwrap();

        sink.record_individual(&record("g1_0"));
        sink.record_individual(&record("g1_1"));
        sink.record_generation(&snapshot(1));

        let loaded = load_generation(sink.generation_path(1)).unwrap();
        assert_eq!(loaded.generation, 1);
        assert_eq!(loaded.evaluations, 4);
        assert_eq!(loaded.vehicle_archive.members[0].id, "g1_0");

        let lines = fs::read_to_string(sink.dir().join("individuals.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("generation_0.json");
        fs::write(&path, "not json").unwrap();
        let err = load_generation(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_log_sink_accepts_everything() {
        let mut sink = LogSink;
        sink.record_individual(&record("g0_0"));
        sink.record_generation(&snapshot(0));
    }
}
