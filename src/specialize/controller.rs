//! The one-slot container state and the transition that fills it.

use crate::function::{FenvFunction, NativeFunction};
use crate::loader::{ArtifactLoader, Candidate};
use crate::specialize::{SelectionPolicy, SpecializeError};
use fenv_sdk::{ABI_VERSION, FUNCTION_CONTRACT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

/// Lifecycle state of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// No function loaded; requests are refused.
    Unspecialized,
    /// A function instance is serving requests.
    Specialized { type_name: String },
}

/// Result of a successful specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specialized {
    pub type_name: String,
    /// Whether this replaced a previously loaded function.
    pub replaced: bool,
}

/// Owns the container's function slot.
///
/// The slot goes from empty to occupied on the first successful
/// [`specialize`](Specializer::specialize). Later successful calls replace the
/// instance; failed calls never touch it.
pub struct Specializer {
    loader: Arc<dyn ArtifactLoader>,
    code_path: PathBuf,
    policy: SelectionPolicy,
    timeout: Duration,
    slot: RwLock<Option<Arc<dyn FenvFunction>>>,
    gate: Arc<Mutex<()>>,
}

impl Specializer {
    pub fn new(
        loader: Arc<dyn ArtifactLoader>,
        code_path: impl Into<PathBuf>,
        policy: SelectionPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            loader,
            code_path: code_path.into(),
            policy,
            timeout,
            slot: RwLock::new(None),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Load the artifact, pick and instantiate a function, and store it.
    ///
    /// At most one specialization runs at a time; callers queue on the gate.
    /// The blocking load owns the gate until it returns, so a timed-out
    /// attempt still finishes before the next one starts.
    pub async fn specialize(&self) -> Result<Specialized, SpecializeError> {
        let guard = self.gate.clone().lock_owned().await;
        let start = Instant::now();

        info!("Specializing environment from {}", self.code_path.display());

        let loader = self.loader.clone();
        let path = self.code_path.clone();
        let policy = self.policy.clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = load_function(loader.as_ref(), &path, &policy);
            (result, guard)
        });

        let (function, _guard) = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok((Ok(function), guard))) => (function, guard),
            Ok(Ok((Err(e), _))) => {
                error!("Specialization failed: {}", e);
                return Err(e);
            }
            Ok(Err(join_err)) => {
                error!("Specialization task failed: {}", join_err);
                return Err(SpecializeError::Task(join_err.to_string()));
            }
            Err(_) => {
                error!("Specialization timed out after {:?}", self.timeout);
                return Err(SpecializeError::Timeout(self.timeout));
            }
        };

        let type_name = function.type_name().to_string();
        let previous = self.slot.write().await.replace(function);

        let replaced = previous.is_some();
        if let Some(previous) = previous {
            info!(
                "Replaced function {} with {}",
                previous.type_name(),
                type_name
            );
            // Destroying the old instance runs user code.
            if let Err(e) = tokio::task::spawn_blocking(move || drop(previous)).await {
                error!("Releasing the previous function failed: {}", e);
            }
        }

        info!(
            "Specialized with {} in {:?}",
            type_name,
            start.elapsed()
        );
        Ok(Specialized { type_name, replaced })
    }

    /// The loaded function, if any.
    pub async fn current(&self) -> Option<Arc<dyn FenvFunction>> {
        self.slot.read().await.clone()
    }

    pub async fn state(&self) -> ContainerState {
        match self.slot.read().await.as_ref() {
            Some(function) => ContainerState::Specialized {
                type_name: function.type_name().to_string(),
            },
            None => ContainerState::Unspecialized,
        }
    }
}

/// Everything between reading the artifact and holding a live instance.
/// Runs on the blocking pool since it touches the disk and user code.
fn load_function(
    loader: &dyn ArtifactLoader,
    path: &Path,
    policy: &SelectionPolicy,
) -> Result<Arc<dyn FenvFunction>, SpecializeError> {
    let artifact = loader.load(path)?;
    let candidates = artifact.find_implementations(FUNCTION_CONTRACT);
    debug!(
        "{} exports {} types, {} implement {}",
        artifact.origin(),
        artifact.type_count(),
        candidates.len(),
        FUNCTION_CONTRACT
    );
    drop(artifact);

    let candidate = policy.select(candidates, FUNCTION_CONTRACT, path)?;
    let function = instantiate(candidate)?;
    Ok(Arc::new(function))
}

/// Check a candidate's entry points and build an instance with its default
/// constructor.
pub fn instantiate(candidate: Candidate) -> Result<NativeFunction, SpecializeError> {
    let mismatch = |reason: String| SpecializeError::ContractMismatch {
        type_name: candidate.type_name.clone(),
        contract: FUNCTION_CONTRACT.to_string(),
        reason,
    };

    if candidate.abi_version != ABI_VERSION {
        return Err(mismatch(format!(
            "built for ABI version {}, expected {}",
            candidate.abi_version, ABI_VERSION
        )));
    }

    let (handle, free, destroy) = match (candidate.handle, candidate.free, candidate.destroy) {
        (Some(handle), Some(free), Some(destroy)) => (handle, free, destroy),
        _ => return Err(mismatch("missing handle entry points".to_string())),
    };

    let construct = candidate.construct.ok_or_else(|| SpecializeError::Instantiation {
        type_name: candidate.type_name.clone(),
        reason: "no default constructor".to_string(),
    })?;

    let ptr = unsafe { construct() };
    if ptr.is_null() {
        return Err(SpecializeError::Instantiation {
            type_name: candidate.type_name,
            reason: "constructor failed".to_string(),
        });
    }

    Ok(unsafe {
        NativeFunction::from_raw(
            candidate.type_name,
            ptr,
            handle,
            free,
            destroy,
            candidate.library,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{InProcessLoader, LoadError, LoadedArtifact};
    use crate::http::{FenvRequest, Method};
    use fenv_sdk::{
        BoxError, FenvTypeDescriptor, FenvTypeTable, FenvWireRequest, FenvWireResponse, Function,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Greeter;

    impl Function for Greeter {
        fn handle(&self, _request: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
            Ok("hi".into())
        }
    }

    struct Exploding;

    impl Default for Exploding {
        fn default() -> Self {
            panic!("boom")
        }
    }

    impl Function for Exploding {
        fn handle(&self, _request: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
            unreachable!()
        }
    }

    static GREETER: [FenvTypeDescriptor; 1] = [FenvTypeDescriptor::function::<Greeter>("t::Greeter")];
    static NO_DEFAULT: [FenvTypeDescriptor; 1] =
        [FenvTypeDescriptor::without_constructor::<Greeter>("t::NoDefault")];
    static EXPLODING: [FenvTypeDescriptor; 1] =
        [FenvTypeDescriptor::function::<Exploding>("t::Exploding")];
    static OLD_ABI: [FenvTypeDescriptor; 1] = [FenvTypeDescriptor {
        abi_version: 0,
        ..FenvTypeDescriptor::function::<Greeter>("t::OldAbi")
    }];
    static NO_HANDLE: [FenvTypeDescriptor; 1] = [FenvTypeDescriptor {
        handle: None,
        ..FenvTypeDescriptor::function::<Greeter>("t::NoHandle")
    }];

    extern "C" fn greeter() -> FenvTypeTable {
        FenvTypeTable::from_static(&GREETER)
    }
    extern "C" fn no_default() -> FenvTypeTable {
        FenvTypeTable::from_static(&NO_DEFAULT)
    }
    extern "C" fn exploding() -> FenvTypeTable {
        FenvTypeTable::from_static(&EXPLODING)
    }
    extern "C" fn old_abi() -> FenvTypeTable {
        FenvTypeTable::from_static(&OLD_ABI)
    }
    extern "C" fn no_handle() -> FenvTypeTable {
        FenvTypeTable::from_static(&NO_HANDLE)
    }

    fn specializer(loader: impl ArtifactLoader + 'static) -> Specializer {
        Specializer::new(
            Arc::new(loader),
            "/userfunc/user",
            SelectionPolicy::FirstByName,
            Duration::from_secs(5),
        )
    }

    fn in_process(types: fenv_sdk::TypesFn) -> Specializer {
        specializer(InProcessLoader::new(types))
    }

    /// Counts load calls and always fails.
    struct FailingLoader {
        calls: AtomicUsize,
    }

    impl ArtifactLoader for FailingLoader {
        fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LoadError::NotFound(path.to_path_buf()))
        }
    }

    /// Records the most loads it ever saw running at once.
    #[derive(Default)]
    struct OverlapLoader {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ArtifactLoader for OverlapLoader {
        fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            InProcessLoader::new(greeter).load(path)
        }
    }

    static DROPPED_ON: std::sync::Mutex<Option<std::thread::ThreadId>> =
        std::sync::Mutex::new(None);

    /// Remembers which thread destroyed it.
    #[derive(Default)]
    struct Tracked;

    impl Drop for Tracked {
        fn drop(&mut self) {
            *DROPPED_ON.lock().unwrap() = Some(std::thread::current().id());
        }
    }

    impl Function for Tracked {
        fn handle(&self, _request: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
            Ok("tracked".into())
        }
    }

    static TRACKED: [FenvTypeDescriptor; 1] = [FenvTypeDescriptor::function::<Tracked>("t::Tracked")];

    extern "C" fn tracked() -> FenvTypeTable {
        FenvTypeTable::from_static(&TRACKED)
    }

    /// Blocks longer than any test timeout.
    struct SlowLoader;

    impl ArtifactLoader for SlowLoader {
        fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
            std::thread::sleep(Duration::from_millis(300));
            InProcessLoader::new(greeter).load(path)
        }
    }

    #[tokio::test]
    async fn test_starts_unspecialized() {
        let specializer = in_process(greeter);
        assert_eq!(specializer.state().await, ContainerState::Unspecialized);
        assert!(specializer.current().await.is_none());
    }

    #[tokio::test]
    async fn test_specialize_success() {
        let specializer = in_process(greeter);
        let outcome = assert_ok!(specializer.specialize().await);
        assert_eq!(outcome.type_name, "t::Greeter");
        assert!(!outcome.replaced);

        assert_eq!(
            specializer.state().await,
            ContainerState::Specialized {
                type_name: "t::Greeter".to_string()
            }
        );

        let function = specializer.current().await.unwrap();
        let response = function
            .handle(FenvRequest::new(Method::Get, "/"))
            .await
            .unwrap();
        assert_eq!(response.text_body(), Some("hi".to_string()));
    }

    #[tokio::test]
    async fn test_respecialize_replaces() {
        let specializer = in_process(greeter);
        assert_ok!(specializer.specialize().await);
        let outcome = assert_ok!(specializer.specialize().await);
        assert!(outcome.replaced);
    }

    #[tokio::test]
    async fn test_missing_constructor() {
        let specializer = in_process(no_default);
        let err = assert_err!(specializer.specialize().await);
        assert_eq!(
            err.to_string(),
            "could not instantiate user type t::NoDefault: no default constructor"
        );
        assert_eq!(specializer.state().await, ContainerState::Unspecialized);
    }

    #[tokio::test]
    async fn test_constructor_panic() {
        let specializer = in_process(exploding);
        let err = assert_err!(specializer.specialize().await);
        assert!(matches!(
            err,
            SpecializeError::Instantiation { ref type_name, .. } if type_name == "t::Exploding"
        ));
        assert_eq!(specializer.state().await, ContainerState::Unspecialized);
    }

    #[tokio::test]
    async fn test_contract_mismatch() {
        let cases: [fenv_sdk::TypesFn; 2] = [old_abi, no_handle];
        for types in cases {
            let specializer = in_process(types);
            let err = assert_err!(specializer.specialize().await);
            assert!(matches!(err, SpecializeError::ContractMismatch { .. }));
            assert!(err.to_string().contains(FUNCTION_CONTRACT));
            assert_eq!(specializer.state().await, ContainerState::Unspecialized);
        }
    }

    #[tokio::test]
    async fn test_loader_failure_keeps_previous_function() {
        let specializer = in_process(greeter);
        assert_ok!(specializer.specialize().await);

        let failing = specializer_with_slot_of(&specializer).await;
        let err = assert_err!(failing.specialize().await);
        assert!(matches!(err, SpecializeError::Load(LoadError::NotFound(_))));
        assert_eq!(
            failing.state().await,
            ContainerState::Specialized {
                type_name: "t::Greeter".to_string()
            }
        );
    }

    /// A specializer with a failing loader that starts out holding the
    /// function of `other`.
    async fn specializer_with_slot_of(other: &Specializer) -> Specializer {
        let failing = specializer(FailingLoader {
            calls: AtomicUsize::new(0),
        });
        *failing.slot.write().await = other.current().await;
        failing
    }

    #[tokio::test]
    async fn test_each_call_reloads() {
        let loader = Arc::new(FailingLoader {
            calls: AtomicUsize::new(0),
        });
        let specializer = Specializer::new(
            loader.clone(),
            "/userfunc/user",
            SelectionPolicy::FirstByName,
            Duration::from_secs(5),
        );

        assert_err!(specializer.specialize().await);
        assert_err!(specializer.specialize().await);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let specializer = Specializer::new(
            Arc::new(SlowLoader),
            "/userfunc/user",
            SelectionPolicy::FirstByName,
            Duration::from_millis(20),
        );

        let err = assert_err!(specializer.specialize().await);
        assert!(matches!(err, SpecializeError::Timeout(_)));
        assert_eq!(specializer.state().await, ContainerState::Unspecialized);
    }

    #[tokio::test]
    async fn test_timed_out_load_holds_the_gate() {
        let loader = Arc::new(OverlapLoader::default());
        let specializer = Specializer::new(
            loader.clone(),
            "/userfunc/user",
            SelectionPolicy::FirstByName,
            Duration::from_millis(20),
        );

        let err = assert_err!(specializer.specialize().await);
        assert!(matches!(err, SpecializeError::Timeout(_)));
        let err = assert_err!(specializer.specialize().await);
        assert!(matches!(err, SpecializeError::Timeout(_)));

        // The second load only started after the first one returned.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replaced_instance_is_destroyed_off_the_runtime_thread() {
        let specializer = in_process(tracked);
        assert_ok!(specializer.specialize().await);
        assert!(DROPPED_ON.lock().unwrap().is_none());

        assert_ok!(specializer.specialize().await);
        let dropped_on = DROPPED_ON.lock().unwrap().expect("old instance destroyed");
        assert_ne!(dropped_on, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_concurrent_specializations_are_serialized() {
        let specializer = Arc::new(in_process(greeter));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let specializer = specializer.clone();
                tokio::spawn(async move { specializer.specialize().await })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if !outcome.replaced {
                fresh += 1;
            }
        }
        // Only the first one to take the gate found the slot empty.
        assert_eq!(fresh, 1);
    }
}
