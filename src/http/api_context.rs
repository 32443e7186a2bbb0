use crate::config::Config;
use crate::models::DynStore;
use crate::upstream::exercisedb::DynExerciseSource;
use crate::upstream::inference::DynChatBackend;
use std::sync::Arc;

/// Shared state for every handler, taken as `State<ApiContext>`.
///
/// The store and both upstream clients sit behind trait objects so tests can swap in mocks.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<Config>,
    pub store: DynStore,
    pub exercises: DynExerciseSource,
    pub chat: DynChatBackend,
}
