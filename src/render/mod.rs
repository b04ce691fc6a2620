//! Render Context
//!
//! - [`command`]: commands and selection states
//! - [`fence`]: batch completion fences
//! - [`publish`]: the batched mutation-to-render queue
//! - [`proxy`]: per-material render proxies with chained lookups
//! - [`scene`]: the render-context owner of all proxies

pub mod command;
pub mod fence;
pub mod proxy;
pub mod publish;
pub mod scene;

pub use command::{ProxyInit, ProxyValues, RenderCommand, SELECTION_STATE_COUNT, SelectionState};
pub use fence::{FenceCounter, RenderFence};
pub use proxy::RenderProxy;
pub use publish::{CommandBatch, CommandReceiver, PublishQueue};
pub use scene::RenderScene;
