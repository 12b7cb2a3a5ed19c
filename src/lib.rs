// chatmount - declarative component trees rendered as chat messages
//
// A host UI framework mutates a component tree through the mutation surface;
// committed changes are coalesced per container and handed to a platform
// adapter, which turns a snapshot into one outbound message.
//
// Architecture:
// - Tree: arena of components grouped into containers (one per chat)
// - Builder: component factory with key and id bookkeeping
// - Host: mutation surface the framework drives (create/append/commit)
// - Scheduler: per-container debounce task in front of the adapter
// - Events: listener registry for mounted/update/failure notifications
// - Renderer: facade tying the above to an adapter, navigator and storage

pub mod adapter;
pub mod builder;
pub mod config;
pub mod events;
pub mod host;
pub mod logging;
pub mod renderer;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod suspend;
pub mod tree;

pub use adapter::{Adapter, MenuEntry, Navigator, Route};
pub use builder::{BuildError, HostContext};
pub use events::{ListenerId, RenderEvent};
pub use host::{HostError, MutationSurface};
pub use renderer::{RedirectOptions, RenderError, Renderer};
pub use scheduler::{SchedulerConfig, SchedulerPhase};
pub use snapshot::ContainerSnapshot;
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageNavigator};
pub use tree::{ComponentJson, ContainerId, InstanceType, NodeId, Props};
