//! Script Binding Layer
//!
//! Bridges native code and the embedded JavaScript engine: handle lifetimes,
//! value marshaling, native-backed script classes, calls in both directions
//! and an integer-indexed cache of script values.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Script code                            │
//! │        new Widget(3)   w.x = 7   cyder.updateFrame(t)       │
//! └──────────────┬──────────────────────────────▲───────────────┘
//!                │ native callbacks             │ Scope::call
//!                v                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Scope<'js>  (engine context + environment token)           │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐    │
//! │  │ marshal  │ │ wrapper  │ │  class   │ │   dispatch   │    │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────────┘    │
//! └──────────────┬──────────────────────────────────────────────┘
//!                │
//!                v
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Environment  (runtime, context, aligned registry,          │
//! │                durable handles, wrapper type info)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod class;
pub mod dispatch;
pub mod environment;
pub mod handle;
pub mod marshal;
pub mod registry;
pub mod wrapper;

pub use class::{AccessorDescriptor, ClassDescriptor, ConstructorCallback, GetterCallback, MethodDescriptor, SetterCallback};
pub use dispatch::{CallArgs, CallInfo, CaughtException, ErrorType, NativeCallback, NativeFn};
pub use environment::{EnvToken, Environment, Scope};
pub use handle::{Durable, DurableHandle, HandleStore, Ownership, WeakHandle};
pub use marshal::{Marshal, PropertyValue};
pub use registry::AlignedRegistry;
pub use wrapper::{ConstantDescriptor, ConstantValue, HostObject, WrapperTypeInfo};
