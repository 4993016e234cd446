use super::DeferredPipelineCompile;
use crate::{cache::OnceCache, device::Device, hash::Hash, VulkanError};
use ash::vk;
use foldhash::HashMap;
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Whether resolving a pipeline may wait for it to be compiled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineCompileMode {
    /// A missing pipeline is compiled on the spot.
    #[default]
    Blocking,

    /// A missing pipeline is requested from the device, and the draw or dispatch needing it is
    /// skipped until it is ready.
    NonBlocking,
}

/// The slot a device fills in once a deferred pipeline compilation finishes.
#[derive(Debug, Default)]
pub struct PipelineCompletion {
    result: Mutex<Option<Result<vk::Pipeline, VulkanError>>>,
}

impl PipelineCompletion {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the result of the compilation.
    pub fn complete(&self, result: Result<vk::Pipeline, VulkanError>) {
        *self.result.lock() = Some(result);
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.result.lock().is_some()
    }

    fn take(&self) -> Option<Result<vk::Pipeline, VulkanError>> {
        self.result.lock().take()
    }
}

/// A process-wide cache of pipelines, keyed by the hash of their [`DeferredPipelineCompile`].
///
/// A cache hit is trusted without looking any further than the hash. Pipelines are kept until
/// the cache is dropped.
pub struct PipelineCache {
    device: Arc<dyn Device>,
    pipelines: OnceCache<Hash, vk::Pipeline>,
    pending: Mutex<HashMap<Hash, Arc<PipelineCompletion>>>,
    // Requests whose pipeline was built on another path before they completed.
    superseded: Mutex<Vec<Arc<PipelineCompletion>>>,
}

impl PipelineCache {
    pub fn new(device: Arc<dyn Device>) -> Self {
        PipelineCache {
            device,
            pipelines: OnceCache::new(),
            pending: Mutex::new(HashMap::default()),
            superseded: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Returns the pipeline cached under `hash`, if it is ready.
    #[inline]
    pub fn get(&self, hash: Hash) -> Option<vk::Pipeline> {
        self.pipelines.get(&hash)
    }

    /// Returns the number of ready pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns the number of compilations that were requested but not collected yet.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the pipeline for `compile`, building it if needed.
    ///
    /// In [`PipelineCompileMode::NonBlocking`] mode, returns `Ok(None)` while the pipeline is
    /// still being compiled.
    pub fn resolve(
        &self,
        compile: &DeferredPipelineCompile,
        mode: PipelineCompileMode,
    ) -> Result<Option<vk::Pipeline>, VulkanError> {
        let hash = compile.hash();

        if let Some(pipeline) = self.pipelines.get(&hash) {
            return Ok(Some(pipeline));
        }

        match mode {
            PipelineCompileMode::Blocking => {
                if let Some(result) = self.take_pending(hash) {
                    return Ok(Some(self.insert(hash, result?)));
                }

                tracing::debug!(
                    hash = format_args!("{:016x}", hash),
                    compute = compile.is_compute(),
                    "compiling pipeline",
                );

                let pipeline = self.device.create_pipeline(compile)?;

                Ok(Some(self.insert(hash, pipeline)))
            }
            PipelineCompileMode::NonBlocking => self.poll(compile),
        }
    }

    fn poll(&self, compile: &DeferredPipelineCompile) -> Result<Option<vk::Pipeline>, VulkanError> {
        let hash = compile.hash();

        let (completion, requested) = {
            let mut pending = self.pending.lock();

            match pending.get(&hash) {
                Some(completion) => (completion.clone(), false),
                None => {
                    let completion = Arc::new(PipelineCompletion::new());
                    pending.insert(hash, completion.clone());

                    (completion, true)
                }
            }
        };

        if requested {
            tracing::debug!(
                hash = format_args!("{:016x}", hash),
                compute = compile.is_compute(),
                "requesting deferred pipeline compilation",
            );

            self.device
                .create_pipeline_deferred(compile.clone(), completion.clone());
        }

        let Some(result) = completion.take() else {
            return Ok(None);
        };

        self.pending.lock().remove(&hash);

        Ok(Some(self.insert(hash, result?)))
    }

    /// Collects the result of a requested compilation of `hash`, if it finished.
    fn take_pending(&self, hash: Hash) -> Option<Result<vk::Pipeline, VulkanError>> {
        let mut pending = self.pending.lock();
        let result = pending.get(&hash)?.take()?;
        pending.remove(&hash);

        Some(result)
    }

    fn insert(&self, hash: Hash, pipeline: vk::Pipeline) -> vk::Pipeline {
        let (pipeline, duplicate) = self.pipelines.insert_or_get(hash, pipeline);

        // Another thread built the same pipeline in the meantime.
        if let Some(duplicate) = duplicate {
            self.device.destroy_pipeline(duplicate);
        }

        // Nothing polls a request once its pipeline is ready, its result is thrown away when it
        // completes.
        let request = self.pending.lock().remove(&hash);

        if let Some(completion) = request {
            tracing::debug!(
                hash = format_args!("{:016x}", hash),
                "superseding deferred pipeline compilation",
            );
            self.superseded.lock().push(completion);
        }

        self.destroy_superseded();

        pipeline
    }

    fn destroy_superseded(&self) {
        self.superseded
            .lock()
            .retain(|completion| match completion.take() {
                Some(Ok(pipeline)) => {
                    self.device.destroy_pipeline(pipeline);
                    false
                }
                Some(Err(_)) => false,
                None => true,
            });
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        for (_, pipeline) in self.pipelines.drain() {
            self.device.destroy_pipeline(pipeline);
        }

        let pending = self.pending.get_mut().drain().map(|(_, completion)| completion);

        for completion in pending.chain(self.superseded.get_mut().drain(..)) {
            if let Some(Ok(pipeline)) = completion.take() {
                self.device.destroy_pipeline(pipeline);
            }
        }
    }
}

impl fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCache")
            .field("pipelines", &self.pipelines.len())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineCache, PipelineCompileMode};
    use crate::{
        pipeline::{CombinedResourceLayout, DeferredPipelineCompile, PipelineState, PotentialState},
        tests::{compute_program, MockDevice},
        VulkanError,
    };
    use std::sync::Arc;

    fn compile(device: &Arc<MockDevice>) -> DeferredPipelineCompile {
        let program = compute_program(device, CombinedResourceLayout::default());
        DeferredPipelineCompile::compute(
            program,
            &PipelineState::default(),
            &PotentialState::default(),
        )
    }

    #[test]
    fn blocking_builds_once() {
        let device = MockDevice::new();
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        let a = cache.resolve(&compile, PipelineCompileMode::Blocking).unwrap();
        let b = cache.resolve(&compile, PipelineCompileMode::Blocking).unwrap();

        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(device.stats().pipelines_created, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn non_blocking_polls() {
        let device = MockDevice::new();
        device.defer_pipelines(true);
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Ok(None),
        );
        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Ok(None),
        );
        assert_eq!(cache.pending_len(), 1);
        assert_eq!(device.stats().pipelines_requested, 1);

        device.complete_deferred_pipelines();

        let pipeline = cache
            .resolve(&compile, PipelineCompileMode::NonBlocking)
            .unwrap();
        assert!(pipeline.is_some());
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.get(compile.hash()), pipeline);
    }

    #[test]
    fn blocking_collects_a_finished_request() {
        let device = MockDevice::new();
        device.defer_pipelines(true);
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Ok(None),
        );
        device.complete_deferred_pipelines();

        let pipeline = cache
            .resolve(&compile, PipelineCompileMode::Blocking)
            .unwrap();
        assert!(pipeline.is_some());
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(device.stats().pipelines_created, 1);
    }

    #[test]
    fn blocking_supersedes_an_unfinished_request() {
        let device = MockDevice::new();
        device.defer_pipelines(true);
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Ok(None),
        );

        let pipeline = cache
            .resolve(&compile, PipelineCompileMode::Blocking)
            .unwrap();
        assert!(pipeline.is_some());
        assert_eq!(cache.pending_len(), 0);

        device.complete_deferred_pipelines();
        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Ok(pipeline),
        );
        assert_eq!(cache.resolve(&compile, PipelineCompileMode::Blocking), Ok(pipeline));
        assert_eq!(device.stats().pipelines_requested, 1);

        drop(cache);

        let stats = device.stats();
        assert_eq!(stats.pipelines_created, 2);
        assert_eq!(stats.pipelines_destroyed, 2);
    }

    #[test]
    fn non_blocking_completes_immediately() {
        let device = MockDevice::new();
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        let pipeline = cache
            .resolve(&compile, PipelineCompileMode::NonBlocking)
            .unwrap();
        assert!(pipeline.is_some());
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn errors_are_not_cached() {
        let device = MockDevice::new();
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        device.fail_pipelines(true);
        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::Blocking),
            Err(VulkanError::OutOfDeviceMemory),
        );
        assert_eq!(
            cache.resolve(&compile, PipelineCompileMode::NonBlocking),
            Err(VulkanError::OutOfDeviceMemory),
        );
        assert_eq!(cache.pending_len(), 0);

        device.fail_pipelines(false);
        assert!(cache
            .resolve(&compile, PipelineCompileMode::Blocking)
            .unwrap()
            .is_some());
    }

    #[test]
    fn drop_destroys_pipelines() {
        let device = MockDevice::new();
        let cache = PipelineCache::new(device.clone());
        let compile = compile(&device);

        cache.resolve(&compile, PipelineCompileMode::Blocking).unwrap();
        drop(cache);

        assert_eq!(device.stats().pipelines_destroyed, 1);
    }

    #[test]
    fn racing_threads_share_one_pipeline() {
        let device = MockDevice::new();
        let cache = Arc::new(PipelineCache::new(device.clone()));
        let compile = compile(&device);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let compile = compile.clone();
                std::thread::spawn(move || {
                    cache
                        .resolve(&compile, PipelineCompileMode::Blocking)
                        .unwrap()
                })
            })
            .collect();

        let pipelines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(pipelines.windows(2).all(|w| w[0] == w[1]));

        let stats = device.stats();
        assert_eq!(stats.pipelines_created - stats.pipelines_destroyed, 1);
    }
}
