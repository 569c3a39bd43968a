//! # Cyder
//!
//! Embeds a JavaScript engine (QuickJS via `rquickjs`) in a native host and
//! drives a script-authored frame loop.
//!
//! ## Features
//!
//! - **Environment**: one engine context per environment, with explicit
//!   context passing into every native callback
//! - **Handles**: scope-bound transient handles, strong and weak durable handles
//! - **Aligned Registry**: integer-indexed cache of script values for hot paths
//! - **Marshaling**: lossless-where-possible scalar conversion with defaults
//! - **Native Classes**: script classes backed by native values
//! - **Frame Driver**: resolves `cyder.updateFrame` once and calls it every frame
//!
//! ### Example
//!
//! ```no_run
//! use cyder::bindings::Environment;
//! use cyder::scripting::FrameDriver;
//!
//! let env = Environment::new()?;
//! let mut driver = FrameDriver::new(env, "main.js")?;
//! loop {
//!     driver.update();
//! }
//! # Ok::<(), cyder::core::BridgeError>(())
//! ```
//!
//! ## Modules
//!
//! - [`bindings`]: Script binding layer
//! - [`scripting`]: Frame driver and built-in script globals
//! - [`core`]: Host loop, errors and utilities
//! - [`config`]: Host configuration

/// Host loop, error types and utilities
pub mod core;
/// Script binding layer
pub mod bindings;
/// Frame driver and built-in script globals
pub mod scripting;
/// Configuration system
pub mod config;
