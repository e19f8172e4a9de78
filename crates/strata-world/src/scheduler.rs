//! Parallel save of every resident chunk.
//!
//! Resident chunks are grouped by quad and each quad is saved by a pool of
//! scoped worker threads. Workers only read the chunk map; evictions are
//! collected under a mutex and applied after every worker has joined, so the
//! map is never mutated while a save reads it.

use std::fs;
use std::thread;
use std::time::Instant;

use ahash::AHashSet;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use strata_common::{ChunkCoord, QuadCoord};
use tracing::{debug, info, warn};

use crate::active::ActiveArea;
use crate::cache::ChunkCache;
use crate::chunk::Chunk;
use crate::codec::{self, ChunkMap, CodecResult, QuadOutcome};
use crate::layout::MapLayout;
use crate::progress::SaveProgress;

/// One quad to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuadJob {
    quad: QuadCoord,
    evict: bool,
}

/// Summary of one `save_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Distinct quads with resident chunks
    pub quads: usize,
    /// Quads written to disk
    pub written: usize,
    /// Chunk records written
    pub records: usize,
    /// Quads skipped because every resident chunk was uniform
    pub skipped: usize,
    /// Quads whose stale file was removed
    pub tombstoned: usize,
    /// Quads that failed to save; their chunks stay resident
    pub failed: Vec<QuadCoord>,
    /// Chunks evicted after the save
    pub evicted: usize,
}

impl SaveReport {
    /// Returns true if every quad was saved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, quad: QuadCoord, result: CodecResult<QuadOutcome>) {
        match result {
            Ok(QuadOutcome::Written(records)) => {
                self.written += 1;
                self.records += records;
            },
            Ok(QuadOutcome::Skipped) => self.skipped += 1,
            Ok(QuadOutcome::Tombstoned) => self.tombstoned += 1,
            Err(e) => {
                warn!("Failed to save quad {quad}: {e}");
                self.failed.push(quad);
            },
        }
    }
}

/// Read-only state shared by the save workers.
struct SaveContext<'a, C> {
    layout: &'a MapLayout,
    chunks: &'a ChunkMap<C>,
    pretty: bool,
    evictions: &'a Mutex<Vec<ChunkCoord>>,
}

impl<C: Chunk> SaveContext<'_, C> {
    fn run(&self, job: QuadJob) -> CodecResult<QuadOutcome> {
        let saved = codec::save_quad(self.layout, self.chunks, job.quad, job.evict, self.pretty)?;
        if !saved.evict.is_empty() {
            self.evictions.lock().extend(saved.evict);
        }
        Ok(saved.outcome)
    }

    fn drain(
        &self,
        jobs: &Receiver<QuadJob>,
        done: &Sender<(QuadCoord, CodecResult<QuadOutcome>)>,
    ) {
        for job in jobs {
            if done.send((job.quad, self.run(job))).is_err() {
                break;
            }
        }
    }
}

impl<C: Chunk> ChunkCache<C> {
    /// Saves every resident chunk, then evicts what no longer needs to stay
    /// resident.
    ///
    /// With `delete_after_save` every saved chunk is evicted. Quads outside
    /// `active` are evicted too when the config's `evict_inactive_on_save` is
    /// set. A quad that fails to save is logged and keeps its chunks; the
    /// other quads are unaffected.
    pub fn save_all<A, P>(
        &mut self,
        delete_after_save: bool,
        active: &A,
        progress: &mut P,
    ) -> SaveReport
    where
        A: ActiveArea + ?Sized,
        P: SaveProgress + ?Sized,
    {
        let started = Instant::now();
        let jobs = self.plan_save(delete_after_save, active);
        let total = jobs.len();
        let mut report = SaveReport {
            quads: total,
            ..SaveReport::default()
        };
        if total == 0 {
            return report;
        }

        let maps_dir = self.layout.maps_dir();
        if let Err(e) = fs::create_dir_all(&maps_dir) {
            warn!("Failed to create {}: {e}", maps_dir.display());
        }

        let evictions = Mutex::new(Vec::new());
        let ctx = SaveContext {
            layout: &self.layout,
            chunks: &self.chunks,
            pretty: self.config.pretty_json,
            evictions: &evictions,
        };
        let workers = self.config.worker_count(total);
        let interval = self.config.progress_interval();

        thread::scope(|scope| {
            let (job_tx, job_rx) = crossbeam_channel::unbounded();
            let (done_tx, done_rx) = crossbeam_channel::unbounded();
            for job in jobs {
                let _ = job_tx.send(job);
            }
            drop(job_tx);

            let mut spawned = 0;
            for i in 0..workers {
                let (jobs, done, ctx) = (job_rx.clone(), done_tx.clone(), &ctx);
                let handle = thread::Builder::new()
                    .name(format!("strata-save-{i}"))
                    .spawn_scoped(scope, move || ctx.drain(&jobs, &done));
                match handle {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!("Failed to start save worker {i}: {e}"),
                }
            }
            if spawned == 0 {
                warn!("No save workers available, saving {total} quads on this thread");
                ctx.drain(&job_rx, &done_tx);
            }
            drop(done_tx);

            let mut completed = 0;
            let mut last_update = Instant::now();
            while completed < total {
                match done_rx.recv_timeout(interval) {
                    Ok((quad, result)) => {
                        completed += 1;
                        report.record(quad, result);
                    },
                    Err(RecvTimeoutError::Timeout) => {},
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                if last_update.elapsed() >= interval {
                    progress.update(completed, total);
                    last_update = Instant::now();
                }
            }
        });

        let mut evictions = evictions.into_inner();
        evictions.sort_unstable();
        evictions.dedup();
        for coord in evictions {
            if self.remove(coord).is_ok() {
                report.evicted += 1;
            }
        }

        info!(
            "Saved {} quads ({} written, {} uniform, {} removed, {} failed), \
             evicted {} chunks in {:?}",
            report.quads,
            report.written,
            report.skipped,
            report.tombstoned,
            report.failed.len(),
            report.evicted,
            started.elapsed()
        );
        report
    }

    /// Groups resident chunks by quad, in first-seen order.
    fn plan_save<A: ActiveArea + ?Sized>(
        &self,
        delete_after_save: bool,
        active: &A,
    ) -> Vec<QuadJob> {
        let mut seen = AHashSet::new();
        let mut jobs = Vec::new();
        for coord in self.chunks.keys() {
            let quad = coord.quad();
            if !seen.insert(quad) {
                continue;
            }
            let inactive = self.config.evict_inactive_on_save && !active.contains_quad(quad);
            jobs.push(QuadJob {
                quad,
                evict: delete_after_save || inactive,
            });
        }
        debug!("Planned {} quad saves for {} chunks", jobs.len(), self.chunks.len());
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::{ActiveBox, Everything, Nothing};
    use crate::chunk::{PayloadResult, PayloadWriter, RawChunk};
    use crate::config::MapConfig;
    use crate::progress::NoProgress;
    use crate::terrain::{FlatTerrain, TerrainClass};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(root: &std::path::Path, workers: usize) -> ChunkCache<RawChunk> {
        let mut config = MapConfig::for_world(root);
        config.save_workers = workers;
        ChunkCache::new(config, FlatTerrain(TerrainClass::uniform("open_air")))
    }

    fn fill(cache: &mut ChunkCache<RawChunk>, quad: QuadCoord, tag: &str) {
        for coord in quad.chunks() {
            cache
                .insert(coord, RawChunk::new().with_member("tag", json!(tag)))
                .expect("insert failed");
        }
    }

    #[test]
    fn test_save_all_writes_every_quad() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 3);
        let quads: Vec<_> = (0..8).map(|i| QuadCoord::new(i * 40, -i, 0)).collect();
        for (i, quad) in quads.iter().enumerate() {
            fill(&mut cache, *quad, &format!("quad-{i}"));
        }

        let report = cache.save_all(false, &Everything, &mut NoProgress);
        assert!(report.is_complete());
        assert_eq!(report.quads, 8);
        assert_eq!(report.written, 8);
        assert_eq!(report.records, 32);
        assert_eq!(report.evicted, 0);
        assert_eq!(cache.len(), 32);
        for quad in &quads {
            assert!(cache.layout().locate(*quad).is_file());
        }
    }

    #[test]
    fn test_save_all_then_reload() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let quad = QuadCoord::new(-7, 9, -1);
        {
            let mut cache = open(dir.path(), 0);
            fill(&mut cache, quad, "kept");
            let report = cache.save_all(true, &Everything, &mut NoProgress);
            assert_eq!(report.evicted, 4);
            assert!(cache.is_empty());
        }

        let mut cache = open(dir.path(), 0);
        for coord in quad.chunks() {
            let chunk = cache.lookup(coord).expect("chunk not reloaded");
            assert_eq!(chunk.member("tag"), Some(&json!("kept")));
        }
    }

    #[test]
    fn test_uniform_quads_are_evicted_without_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 2);
        let quad = QuadCoord::new(4, 4, 0);
        assert!(cache.exists(quad.origin()));

        let report = cache.save_all(true, &Everything, &mut NoProgress);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.evicted, 4);
        assert!(cache.is_empty());
        assert!(!cache.layout().locate(quad).exists());
    }

    #[test]
    fn test_inactive_quads_are_evicted() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 2);
        let near = QuadCoord::new(0, 0, 0);
        let far = QuadCoord::new(100, 100, 0);
        fill(&mut cache, near, "near");
        fill(&mut cache, far, "far");

        let area = ActiveBox::around(ChunkCoord::new(0, 0, 0), 4, 0, 0);
        let report = cache.save_all(false, &area, &mut NoProgress);
        assert_eq!(report.written, 2);
        assert_eq!(report.evicted, 4);
        assert!(near.chunks().iter().all(|c| cache.contains(*c)));
        assert!(far.chunks().iter().all(|c| !cache.contains(*c)));
    }

    #[test]
    fn test_inactive_eviction_can_be_disabled() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = MapConfig::for_world(dir.path());
        config.evict_inactive_on_save = false;
        let mut cache: ChunkCache<RawChunk> =
            ChunkCache::new(config, FlatTerrain(TerrainClass::varied("field")));
        fill(&mut cache, QuadCoord::new(1, 1, 0), "x");

        let report = cache.save_all(false, &Nothing, &mut NoProgress);
        assert_eq!(report.written, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_failed_quad_keeps_chunks_and_siblings_save() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 4);
        // Each quad sits in its own segment directory.
        let quads: Vec<_> = (0..5).map(|i| QuadCoord::new(i * 32, 0, 0)).collect();
        for quad in &quads {
            fill(&mut cache, *quad, "data");
        }
        let broken = quads[2];
        fs::create_dir_all(cache.layout().maps_dir()).expect("mkdir failed");
        fs::write(cache.layout().segment_dir(broken), "blocks the directory")
            .expect("write failed");

        let report = cache.save_all(true, &Everything, &mut NoProgress);
        assert_eq!(report.failed, vec![broken]);
        assert_eq!(report.written, 4);
        assert_eq!(report.evicted, 16);
        assert_eq!(cache.len(), 4);
        assert!(broken.chunks().iter().all(|c| cache.contains(*c)));
        for quad in quads.iter().filter(|q| **q != broken) {
            assert!(cache.layout().locate(*quad).is_file());
        }
    }

    #[test]
    fn test_reverted_quad_is_removed_on_save_all() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 2);
        let quad = QuadCoord::new(3, 3, 0);
        fill(&mut cache, quad, "built");
        cache.save_all(false, &Everything, &mut NoProgress);
        assert!(cache.layout().locate(quad).is_file());

        for coord in quad.chunks() {
            cache.get_mut(coord).expect("chunk missing").revert_to_uniform();
        }
        let report = cache.save_all(false, &Everything, &mut NoProgress);
        assert_eq!(report.tombstoned, 1);
        assert!(!cache.layout().locate(quad).exists());
    }

    /// Chunk whose payload takes a while to write.
    struct SlowChunk(RawChunk);

    impl Chunk for SlowChunk {
        fn blank() -> Self {
            Self(RawChunk::blank())
        }

        fn uniform(coord: ChunkCoord, terrain: &TerrainClass) -> Self {
            Self(RawChunk::uniform(coord, terrain))
        }

        fn is_uniform(&self) -> bool {
            self.0.is_uniform()
        }

        fn is_reverted(&self) -> bool {
            self.0.is_reverted()
        }

        fn store(&self, out: &mut PayloadWriter) -> PayloadResult<()> {
            thread::sleep(Duration::from_millis(20));
            self.0.store(out)
        }

        fn load_member(&mut self, name: &str, value: Value, version: u32) -> PayloadResult<()> {
            self.0.load_member(name, value, version)
        }
    }

    #[test]
    fn test_progress_is_reported_while_saving() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = MapConfig::for_world(dir.path());
        config.save_workers = 1;
        config.progress_interval_ms = 50;
        let mut cache: ChunkCache<SlowChunk> =
            ChunkCache::new(config, FlatTerrain(TerrainClass::varied("field")));
        for i in 0..8 {
            for coord in QuadCoord::new(i, 0, 0).chunks() {
                let chunk = RawChunk::new().with_member("tag", json!(i));
                assert!(cache.insert(coord, SlowChunk(chunk)).is_ok());
            }
        }

        let mut updates = Vec::new();
        let mut progress = |done: usize, total: usize| updates.push((done, total));
        let report = cache.save_all(false, &Everything, &mut progress);
        assert!(report.is_complete());
        assert_eq!(report.written, 8);

        assert!(!updates.is_empty());
        assert!(updates.iter().all(|(done, total)| *total == 8 && *done <= 8));
        assert!(updates.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        assert!(updates.last().is_some_and(|(done, _)| *done > 0));
    }

    #[test]
    fn test_empty_cache_saves_nothing() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut cache = open(dir.path(), 2);
        let report = cache.save_all(true, &Everything, &mut NoProgress);
        assert_eq!(report, SaveReport::default());
        assert!(!cache.layout().maps_dir().exists());
    }
}
