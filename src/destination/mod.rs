//! Destination-side write engine.
//!
//! Orchestrates one migration write: fetch the destination baseline into a
//! scratch clone, stage the transformed tree under the destination-files
//! glob, commit, optionally rebase onto the moved destination, and push.
//! Review-host destinations compose the same writer with a
//! [`WriteHook`] that manages the pull/merge request lifecycle around the
//! push.

pub mod effect;
pub mod glob;
pub mod label_template;
pub mod same_tree;
pub mod transform;
pub mod write_hook;
pub mod writer;

pub use effect::{DestinationEffect, DestinationRef, EffectType};
pub use glob::Glob;
pub use label_template::expand_labels;
pub use same_tree::same_git_tree;
pub use transform::TransformResult;
pub use write_hook::{DefaultWriteHook, WriteHook};
pub use writer::{AutoConfirm, ConfirmationPrompt, GitDestination, GitDestinationWriter};
