//! Distributed engine: broadcast, compute, gather.
//!
//! Participants are identified by rank, `0..size`, and rank 0 coordinates. One
//! call runs these steps on every participant:
//!
//! 1. the coordinator broadcasts the image header (dimensions, max intensity,
//!    format) to all participants;
//! 2. barrier;
//! 3. every participant filters the *entire* image. Pixel data is never sent,
//!    so participants other than the coordinator filter a blank image built
//!    from the header. Each rank's nominal row band is only logged;
//! 4. barrier;
//! 5. the coordinator keeps its own local result as the gathered image, the
//!    other participants return nothing.
//!
//! The rows are therefore not really partitioned and no halo rows are
//! exchanged. A failure on any participant aborts the whole group so nobody is
//! left waiting in a barrier.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Scope, ScopedJoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::engines::pool::split_span;
use crate::engines::{EngineKind, FilterEngine, SequentialEngine};
use crate::error::{FilterError, Result};
use crate::filters::FilterKind;
use crate::image::{Image, ImageHeader};

/// Rank of the coordinating participant.
pub const ROOT: usize = 0;

/// Collective operations a participant needs.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// One-to-all broadcast from [`ROOT`]. The root passes `Some(header)`,
    /// everybody else `None`; all ranks return the root's header.
    fn broadcast(&self, header: Option<ImageHeader>) -> Result<ImageHeader>;

    /// Block until every participant reached the barrier.
    fn barrier(&self) -> Result<()>;

    /// Make every pending and future collective call fail.
    fn abort(&self, reason: &str);
}

enum Message {
    Header(ImageHeader),
    Abort { rank: usize, reason: String },
}

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: Option<(usize, String)>,
}

struct Shared {
    size: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    inboxes: Vec<Sender<Message>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort(&self, rank: usize, reason: &str) {
        let mut state = self.lock();
        if state.aborted.is_none() {
            log::warn!("rank {rank} aborted the group: {reason}");
            state.aborted = Some((rank, reason.to_string()));
        }
        drop(state);
        self.released.notify_all();

        for inbox in &self.inboxes {
            // A participant that already returned has dropped its receiver
            let _ = inbox.send(Message::Abort {
                rank,
                reason: reason.to_string(),
            });
        }
    }
}

fn collective_failure((rank, reason): &(usize, String)) -> FilterError {
    FilterError::CollectiveFailure {
        rank: *rank,
        reason: reason.clone(),
    }
}

/// In-process group of participants connected by channels and a barrier.
pub struct LocalWorld {
    shared: Arc<Shared>,
}

impl LocalWorld {
    /// Create a group of `size` participants and one communicator per rank.
    pub fn create(size: usize) -> Result<(Self, Vec<LocalCommunicator>)> {
        if size == 0 {
            return Err(FilterError::InvalidConfig(
                "distributed run needs at least one participant".into(),
            ));
        }
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            inboxes: senders,
        });
        let comms = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                shared: Arc::clone(&shared),
                inbox,
            })
            .collect();
        Ok((Self { shared }, comms))
    }

    /// Abort the group on behalf of `rank`.
    pub fn abort(&self, rank: usize, reason: &str) {
        self.shared.abort(rank, reason);
    }
}

/// One participant's handle into a [`LocalWorld`].
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<Shared>,
    inbox: Receiver<Message>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast(&self, header: Option<ImageHeader>) -> Result<ImageHeader> {
        if let Some(aborted) = &self.shared.lock().aborted {
            return Err(collective_failure(aborted));
        }

        if self.rank == ROOT {
            let header = header.ok_or(FilterError::MissingImage)?;
            for inbox in self.shared.inboxes.iter().skip(1) {
                let _ = inbox.send(Message::Header(header));
            }
            return Ok(header);
        }

        match self.inbox.recv() {
            Ok(Message::Header(header)) => Ok(header),
            Ok(Message::Abort { rank, reason }) => {
                Err(FilterError::CollectiveFailure { rank, reason })
            }
            Err(_) => Err(FilterError::CollectiveFailure {
                rank: ROOT,
                reason: "broadcast channel closed".into(),
            }),
        }
    }

    fn barrier(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(aborted) = &state.aborted {
            return Err(collective_failure(aborted));
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            drop(state);
            self.shared.released.notify_all();
            return Ok(());
        }

        while state.generation == generation && state.aborted.is_none() {
            state = self
                .shared
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match &state.aborted {
            Some(aborted) if state.generation == generation => Err(collective_failure(aborted)),
            _ => Ok(()),
        }
    }

    fn abort(&self, reason: &str) {
        self.shared.abort(self.rank, reason);
    }
}

/// Aborts the group if the participant thread unwinds.
struct AbortOnPanic<'a, C: Communicator>(&'a C);

impl<C: Communicator> Drop for AbortOnPanic<'_, C> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort("participant panicked");
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DistributedEngine {
    participants: usize,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
}

impl Default for DistributedEngine {
    fn default() -> Self {
        Self {
            participants: 4,
            #[cfg(test)]
            fail_spawn_at: None,
        }
    }
}

impl DistributedEngine {
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 {
            return Err(FilterError::InvalidConfig(
                "distributed run needs at least one participant".into(),
            ));
        }
        Ok(Self {
            participants,
            ..Self::default()
        })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Run one participant's side of a distributed filter call.
    ///
    /// Only the coordinator's `image` is read. Returns the gathered image on
    /// the coordinator and `None` everywhere else. Any local error aborts the
    /// whole group before being returned.
    pub fn run_participant<C: Communicator>(
        &self,
        image: Option<&Image>,
        filter: FilterKind,
        comm: &C,
    ) -> Result<Option<Image>> {
        let _guard = AbortOnPanic(comm);
        match self.participate(image, filter, comm) {
            Err(err) if !matches!(err, FilterError::CollectiveFailure { .. }) => {
                comm.abort(&err.to_string());
                Err(err)
            }
            result => result,
        }
    }

    fn participate<C: Communicator>(
        &self,
        image: Option<&Image>,
        filter: FilterKind,
        comm: &C,
    ) -> Result<Option<Image>> {
        let (rank, size) = (comm.rank(), comm.size());

        let root_image = if rank == ROOT {
            Some(image.ok_or(FilterError::MissingImage)?)
        } else {
            None
        };
        let header = comm.broadcast(root_image.map(Image::header))?;

        let blank;
        let input = match root_image {
            Some(image) => image,
            None => {
                blank = header.blank()?;
                &blank
            }
        };

        comm.barrier()?;

        let bands = split_span(header.height, size);
        if rank == ROOT {
            log::info!("distributing {} rows across {size} participants", header.height);
            for (r, band) in bands.iter().enumerate() {
                log::debug!("  rank {r}: rows {} to {}", band.start, band.end);
            }
        }
        let band = bands.get(rank).ok_or_else(|| {
            FilterError::InvalidConfig(format!("rank {rank} outside a group of {size}"))
        })?;
        log::debug!(
            "rank {rank}: nominal rows {} to {}, filtering all {}",
            band.start,
            band.end,
            header.height
        );
        let local = SequentialEngine.apply(input, filter)?;

        comm.barrier()?;

        if rank == ROOT {
            log::debug!("gathering results from {size} participants");
            Ok(Some(local))
        } else {
            Ok(None)
        }
    }
}

impl DistributedEngine {
    fn spawn_participant<'scope, 'env, F, T>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        rank: usize,
        work: F,
    ) -> io::Result<ScopedJoinHandle<'scope, T>>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        #[cfg(test)]
        if self.fail_spawn_at == Some(rank) {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "spawn refused"));
        }
        thread::Builder::new()
            .name(format!("parfilter-rank-{rank}"))
            .spawn_scoped(scope, work)
    }
}

impl FilterEngine for DistributedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Distributed
    }

    /// Run all participants as scoped threads of this process and return the
    /// coordinator's image.
    fn apply(&self, image: &Image, filter: FilterKind) -> Result<Image> {
        let (world, comms) = LocalWorld::create(self.participants)?;

        let (gathered, mut errors) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(comms.len());
            let mut errors = Vec::new();

            for comm in comms {
                let rank = comm.rank();
                let input = (rank == ROOT).then_some(image);
                let spawned = self.spawn_participant(scope, rank, move || {
                    self.run_participant(input, filter, &comm)
                });
                match spawned {
                    Ok(handle) => handles.push((rank, handle)),
                    Err(source) => {
                        world.abort(rank, "participant could not be started");
                        errors.push(FilterError::WorkerSpawn {
                            worker: rank,
                            source,
                        });
                        break;
                    }
                }
            }

            let mut gathered = None;
            for (rank, handle) in handles {
                match handle.join() {
                    Ok(Ok(Some(image))) => gathered = Some(image),
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => errors.push(err),
                    Err(_) => errors.push(FilterError::WorkerPanicked { worker: rank }),
                }
            }
            (gathered, errors)
        });

        if !errors.is_empty() {
            // Report the failure that caused the abort rather than its echoes
            let index = errors
                .iter()
                .position(|e| !matches!(e, FilterError::CollectiveFailure { .. }))
                .unwrap_or(0);
            return Err(errors.swap_remove(index));
        }
        gathered.ok_or(FilterError::MissingImage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{PixelBuffer, PixelFormat, Rgb};

    fn sample() -> Image {
        Image::Color(
            PixelBuffer::from_fn(11, 7, 255, |x, y| {
                Rgb::new((x * 23) as u16, (y * 31) as u16, ((x + y) * 9) as u16)
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_coordinator_matches_sequential() {
        let image = sample();
        for participants in 1..=5 {
            let engine = DistributedEngine::new(participants).unwrap();
            for filter in FilterKind::ALL {
                let expected = SequentialEngine.apply(&image, filter).unwrap();
                assert_eq!(engine.apply(&image, filter).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_broadcast_reaches_every_rank() {
        let (_world, comms) = LocalWorld::create(3).unwrap();
        let header = ImageHeader {
            width: 4,
            height: 2,
            max_intensity: 255,
            format: PixelFormat::Gray,
        };

        let received: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let root = (comm.rank() == ROOT).then_some(header);
                        comm.broadcast(root).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(received, vec![header; 3]);
    }

    #[test]
    fn test_missing_root_image_aborts_everyone() {
        let engine = DistributedEngine::new(3).unwrap();
        let (_world, comms) = LocalWorld::create(3).unwrap();

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let engine = &engine;
                    scope.spawn(move || engine.run_participant(None, FilterKind::Blur, comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(matches!(results[0], Err(FilterError::MissingImage)));
        for result in &results[1..] {
            assert!(matches!(
                result,
                Err(FilterError::CollectiveFailure { rank: ROOT, .. })
            ));
        }
    }

    #[test]
    fn test_abort_releases_barrier() {
        let (_world, comms) = LocalWorld::create(2).unwrap();
        let (first, second) = (&comms[0], &comms[1]);

        thread::scope(|scope| {
            let waiter = scope.spawn(move || first.barrier());
            second.abort("disk on fire");
            let err = waiter.join().unwrap().unwrap_err();
            assert!(matches!(err, FilterError::CollectiveFailure { rank: 1, .. }));
        });

        // Later collectives fail immediately
        assert!(second.barrier().is_err());
    }

    #[test]
    fn test_barrier_is_reusable() {
        let (_world, comms) = LocalWorld::create(4).unwrap();
        thread::scope(|scope| {
            for comm in &comms {
                scope.spawn(move || {
                    for _ in 0..10 {
                        comm.barrier().unwrap();
                    }
                });
            }
        });
    }

    enum Fault {
        PanicInBarrier,
        RankOutOfRange,
    }

    /// Wraps a real communicator and misbehaves on one rank.
    struct Faulty<'a> {
        inner: &'a LocalCommunicator,
        fault: Option<Fault>,
    }

    impl Communicator for Faulty<'_> {
        fn rank(&self) -> usize {
            match self.fault {
                Some(Fault::RankOutOfRange) => self.inner.rank() + self.inner.size(),
                _ => self.inner.rank(),
            }
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn broadcast(&self, header: Option<ImageHeader>) -> Result<ImageHeader> {
            self.inner.broadcast(header)
        }

        fn barrier(&self) -> Result<()> {
            if let Some(Fault::PanicInBarrier) = self.fault {
                panic!("barrier exploded");
            }
            self.inner.barrier()
        }

        fn abort(&self, reason: &str) {
            self.inner.abort(reason)
        }
    }

    /// Run every rank of a 3-participant group, `fault` applied on rank 1.
    fn run_with_fault(fault: Fault) -> Vec<thread::Result<Result<Option<Image>>>> {
        let engine = DistributedEngine::new(3).unwrap();
        let image = sample();
        let (_world, comms) = LocalWorld::create(3).unwrap();
        let mut fault = Some(fault);

        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|inner| {
                    let comm = Faulty {
                        inner,
                        fault: if inner.rank() == 1 { fault.take() } else { None },
                    };
                    let (engine, image) = (&engine, &image);
                    let input = (inner.rank() == ROOT).then_some(image);
                    scope.spawn(move || engine.run_participant(input, FilterKind::Blur, &comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        })
    }

    #[test]
    fn test_panicking_participant_aborts_peers() {
        let results = run_with_fault(Fault::PanicInBarrier);
        assert!(results[1].is_err());
        for rank in [0, 2] {
            let result = results[rank].as_ref().unwrap();
            assert!(
                matches!(result, Err(FilterError::CollectiveFailure { rank: 1, .. })),
                "rank {rank}: {result:?}"
            );
        }
    }

    #[test]
    fn test_rank_outside_group_aborts_peers() {
        let results = run_with_fault(Fault::RankOutOfRange);
        assert!(matches!(
            results[1].as_ref().unwrap(),
            Err(FilterError::InvalidConfig(_))
        ));
        for rank in [0, 2] {
            assert!(matches!(
                results[rank].as_ref().unwrap(),
                Err(FilterError::CollectiveFailure { rank: 1, .. })
            ));
        }
    }

    #[test]
    fn test_spawn_failure_aborts_started_participants() {
        let engine = DistributedEngine {
            participants: 4,
            fail_spawn_at: Some(2),
        };
        let err = engine.apply(&sample(), FilterKind::Sharpen).unwrap_err();
        assert!(matches!(err, FilterError::WorkerSpawn { worker: 2, .. }), "{err:?}");
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_zero_participants_rejected() {
        assert!(matches!(
            DistributedEngine::new(0),
            Err(FilterError::InvalidConfig(_))
        ));
    }
}
