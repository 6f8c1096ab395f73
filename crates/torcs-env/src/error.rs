use torcs_link_core::LinkError;

use crate::config::ActionLayout;
use crate::env::EpisodePhase;

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("action has {got} components, {layout:?} expects {expected}")]
    ActionLength { layout: ActionLayout, expected: usize, got: usize },
    #[error("step called while the episode is {0:?}")]
    NotRunning(EpisodePhase),
    #[error("simulator on port {0} ended the session before the first tick")]
    DeadOnReset(u16),
    #[error("vision mode expects {expected} image bytes, got {got}")]
    ImageShape { expected: usize, got: usize },
}
