//! Content transformation.
//!
//! | Piece | Role |
//! |---|---|
//! | [`stage`] | The stage kinds, their options, and environment-conditional selection |
//! | [`chain`] | Runs a selected chain left to right over one asset |
//! | [`references`] | Rewrites `url(...)` references in stylesheets to emitted URLs |
//! | [`toolchain`] | [`Toolchain`] trait: the external minifiers, compilers and optimizers |
//! | [`rust_toolchain`] | Production [`Toolchain`]: oxc, lightningcss, `image`, `sass` |
//!
//! Stages never branch on the environment themselves. A rule declares
//! [`StageSpec::ByEnvironment`] where behavior differs, and [`Chain::build`]
//! resolves it once per build.

pub mod chain;
pub mod references;
pub mod rust_toolchain;
pub mod stage;
pub mod toolchain;

pub use chain::{Chain, TransformError};
pub use references::ReferenceMap;
pub use rust_toolchain::RustToolchain;
pub use stage::{AssetRef, Payload, Stage, StageContext, StageFailure, StageSpec, UrlLoaderOptions};
pub use toolchain::{ToolError, Toolchain};
