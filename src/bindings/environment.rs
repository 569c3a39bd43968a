//! Environment and scope
//!
//! One [`Environment`] owns one engine runtime and one execution context.
//! Native callbacks never look their environment up through global state:
//! every callback receives a [`Scope`], which carries the engine context and
//! an [`EnvToken`] pointing back at the owning environment.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rquickjs::context::EvalOptions;
use rquickjs::{Context, Ctx, FromJs, Object, Runtime, Value};

use super::handle::{Durable, HandleStore};
use super::registry::AlignedRegistry;
use super::wrapper::WrapperTypeInfo;
use crate::config::RuntimeConfig;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::utils::Timer;

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between an [`Environment`] and every callback it installed.
pub struct EnvState {
    id: u64,
    handles: Rc<HandleStore>,
    global: RefCell<Option<Durable>>,
    registry: AlignedRegistry,
    type_infos: RefCell<HashMap<TypeId, &'static WrapperTypeInfo>>,
    timer: Timer,
}

/// Opaque environment token captured by native callbacks.
#[derive(Clone)]
pub struct EnvToken(Rc<EnvState>);

impl EnvToken {
    fn new(id: u64) -> Self {
        let handles = HandleStore::new(id);
        EnvToken(Rc::new(EnvState {
            id,
            registry: AlignedRegistry::new(Rc::clone(&handles)),
            handles,
            global: RefCell::new(None),
            type_infos: RefCell::new(HashMap::new()),
            timer: Timer::start(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn registry(&self) -> &AlignedRegistry {
        &self.0.registry
    }

    /// Storage behind every durable handle of this environment.
    pub fn handles(&self) -> &Rc<HandleStore> {
        &self.0.handles
    }

    /// Monotonic clock started when the environment was created.
    pub fn timer(&self) -> &Timer {
        &self.0.timer
    }

    /// Registers the wrapper metadata of native type `T`. The first
    /// registration wins; later ones are ignored.
    pub fn register_type_info<T: Any>(&self, info: &'static WrapperTypeInfo) {
        self.0
            .type_infos
            .borrow_mut()
            .entry(TypeId::of::<T>())
            .or_insert(info);
    }

    pub fn type_info<T: Any>(&self) -> Option<&'static WrapperTypeInfo> {
        self.type_info_of(TypeId::of::<T>())
    }

    pub fn type_info_of(&self, type_id: TypeId) -> Option<&'static WrapperTypeInfo> {
        self.0.type_infos.borrow().get(&type_id).copied()
    }

    pub fn is_same(&self, other: &EnvToken) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn set_global(&self, global: Durable) {
        *self.0.global.borrow_mut() = Some(global);
    }

    fn global_object<'js>(&self, ctx: &Ctx<'js>) -> Option<Object<'js>> {
        self.0
            .global
            .borrow()
            .as_ref()
            .and_then(|handle| handle.to_object(ctx).ok())
    }

    /// Unpins every value held through a durable handle. Handles that are
    /// still alive afterwards read as released.
    fn release(&self) {
        self.0.registry.clear();
        self.0.global.borrow_mut().take();
        self.0.handles.release();
    }
}

/// One script execution context together with the bridge state bound to it.
///
/// Field order matters: durable handles are released in `Drop`, then the
/// context, then the runtime.
pub struct Environment {
    token: EnvToken,
    context: Context,
    runtime: Runtime,
}

impl Environment {
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> BridgeResult<Self> {
        let runtime = Runtime::new()?;
        if config.memory_limit > 0 {
            runtime.set_memory_limit(config.memory_limit);
        }
        if config.max_stack_size > 0 {
            runtime.set_max_stack_size(config.max_stack_size);
        }
        if config.gc_threshold > 0 {
            runtime.set_gc_threshold(config.gc_threshold);
        }
        let context = Context::full(&runtime)?;

        let token = EnvToken::new(NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed));
        context.with(|ctx| {
            let scope = Scope::new(ctx, token.clone());
            let global = Durable::from_object(&scope, scope.ctx().globals());
            token.set_global(global);
        });

        tracing::debug!(target: "cyder::bindings", id = token.id(), "environment created");
        Ok(Self {
            token,
            context,
            runtime,
        })
    }

    pub fn token(&self) -> &EnvToken {
        &self.token
    }

    /// Opens a transient scope: enters the execution context, runs `f`, and
    /// invalidates every transient handle created inside when `f` returns.
    ///
    /// Must not be called from inside a native callback; callbacks already
    /// receive a [`Scope`].
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Scope<'js>) -> R,
    {
        let token = self.token.clone();
        self.context.with(move |ctx| f(Scope::new(ctx, token)))
    }

    pub fn register_type_info<T: Any>(&self, info: &'static WrapperTypeInfo) {
        self.token.register_type_info::<T>(info);
    }

    /// Runs a full collection, then drains pending jobs so weak handle
    /// finalizers get a chance to run. A job that throws has its trace
    /// printed; draining stops there.
    pub fn run_gc(&self) {
        self.runtime.run_gc();
        if let Err(error) = self.execute_pending_jobs() {
            tracing::warn!(target: "cyder::bindings", id = self.token.id(), "job failed during collection: {}", error);
        }
    }

    /// Executes queued jobs (promise reactions) until the queue is empty,
    /// then runs the finalizers of collected weak handles. Returns how many
    /// jobs ran.
    ///
    /// A job that throws is reported like an uncaught exception: its trace
    /// is printed and the exception is returned. Jobs queued behind it stay
    /// queued.
    pub fn execute_pending_jobs(&self) -> BridgeResult<usize> {
        let mut executed = 0;
        let outcome = loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => executed += 1,
                Ok(false) => break Ok(executed),
                Err(job) => {
                    let token = self.token.clone();
                    let error = job.0.with(|ctx| {
                        let scope = Scope::new(ctx, token);
                        let caught = scope.catch(rquickjs::Error::Exception);
                        scope.print_stack_trace(&caught);
                        caught.into_bridge_error()
                    });
                    break Err(error);
                }
            }
        };
        self.token.handles().run_finalizers();
        outcome
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.token.release();
        tracing::debug!(target: "cyder::bindings", id = self.token.id(), "environment destroyed");
    }
}

/// An entered execution context plus the environment token.
///
/// Transient handles produced through a scope share its `'js` lifetime.
#[derive(Clone)]
pub struct Scope<'js> {
    ctx: Ctx<'js>,
    env: EnvToken,
}

impl<'js> Scope<'js> {
    pub fn new(ctx: Ctx<'js>, env: EnvToken) -> Self {
        Self { ctx, env }
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub fn env(&self) -> &EnvToken {
        &self.env
    }

    /// The global object, read through the environment's durable handle.
    pub fn global(&self) -> Object<'js> {
        self.env
            .global_object(&self.ctx)
            .unwrap_or_else(|| self.ctx.globals())
    }

    /// Evaluates source text as a global script. Strict mode only applies
    /// when the source opts in.
    pub fn eval<V: FromJs<'js>>(&self, source: &str) -> rquickjs::Result<V> {
        self.ctx.eval_with_options(source, script_options())
    }

    /// Reads and runs a script file from a native path. Stack traces name the
    /// file.
    pub fn execute_script<P: AsRef<Path>>(&self, path: P) -> BridgeResult<Value<'js>> {
        let path = path.as_ref();
        let load_error = |source: io::Error| BridgeError::ScriptLoad {
            path: path.to_path_buf(),
            source,
        };
        if path.file_name().is_none() {
            return Err(load_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "script path does not name a file",
            )));
        }
        tracing::debug!(target: "cyder::bindings", path = %path.display(), "executing script");
        self.ctx
            .eval_file_with_options::<Value<'js>, _>(path, script_options())
            .map_err(|error| match error {
                rquickjs::Error::Io(source) => load_error(source),
                error => self.catch(error).into_bridge_error(),
            })
    }

    //==================================== Aligned Methods ====================================

    /// Promotes `value` to a strong durable handle in the aligned registry and
    /// returns its index.
    pub fn save_aligned_value(&self, value: Value<'js>) -> usize {
        self.env.registry().register(&self.ctx, value)
    }

    pub fn read_aligned_value(&self, index: usize) -> BridgeResult<Value<'js>> {
        self.env.registry().get(&self.ctx, index)
    }

    pub fn read_aligned_function(&self, index: usize) -> BridgeResult<rquickjs::Function<'js>> {
        self.env.registry().get_function(&self.ctx, index)
    }

    pub fn read_aligned_object(&self, index: usize) -> BridgeResult<Object<'js>> {
        self.env.registry().get_object(&self.ctx, index)
    }
}

/// Global, non-strict evaluation: scripts run the way a `<script>` tag would.
fn script_options() -> EvalOptions {
    EvalOptions {
        global: true,
        strict: false,
        backtrace_barrier: false,
    }
}
