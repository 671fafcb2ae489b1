/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via replica's
//! [config](crate::replica::Configuration).
//!
//! pbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
//! onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceivePrepare](crate::events::ReceivePrepareEvent) is printed:
//!
//! ```text
//! ReceivePrepare, 1701329264, Id5u7f6, fNGCJyk, 12, 0
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the public key of the
//!   origin of the prepare.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the proposed
//!   block.
//! - The fifth and sixth values are the height and the view of the prepare.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const UPDATE_COMMITTED_PREPARE: &str = "UpdateCommittedPrepare";

pub const PROPOSE: &str = "Propose";
pub const SIGN: &str = "Sign";
pub const COMMIT: &str = "Commit";
pub const VIEW_CHANGE: &str = "ViewChange";

pub const RECEIVE_PREPARE: &str = "ReceivePrepare";
pub const RECEIVE_SIGN: &str = "ReceiveSign";
pub const RECEIVE_COMMIT: &str = "ReceiveCommit";
pub const RECEIVE_VIEW_CHANGE: &str = "ReceiveViewChange";

pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                first_seven_base64_chars(&commit_block_event.block.bytes()),
                commit_block_event.height,
                commit_block_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateCommittedPrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_committed_prepare_event: &UpdateCommittedPrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                UPDATE_COMMITTED_PREPARE,
                secs_since_unix_epoch(update_committed_prepare_event.timestamp),
                first_seven_base64_chars(&update_committed_prepare_event.prepare.block_hash.bytes()),
                update_committed_prepare_event.prepare.height,
                update_committed_prepare_event.prepare.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.prepare.block_hash.bytes()),
                propose_event.prepare.height,
                propose_event.prepare.view,
                propose_event.prepare.block.data.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for SignEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |sign_event: &SignEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SIGN,
                secs_since_unix_epoch(sign_event.timestamp),
                first_seven_base64_chars(&sign_event.sign.block_hash.bytes()),
                sign_event.sign.height,
                sign_event.sign.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                first_seven_base64_chars(&commit_event.commit.block_hash.bytes()),
                commit_event.commit.height,
                commit_event.commit.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_change_event: &ViewChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VIEW_CHANGE,
                secs_since_unix_epoch(view_change_event.timestamp),
                view_change_event.view_change.height,
                view_change_event.view_change.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceivePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_prepare_event: &ReceivePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_PREPARE,
                secs_since_unix_epoch(receive_prepare_event.timestamp),
                first_seven_base64_chars(&receive_prepare_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_prepare_event.prepare.block_hash.bytes()),
                receive_prepare_event.prepare.height,
                receive_prepare_event.prepare.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSignEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sign_event: &ReceiveSignEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_SIGN,
                secs_since_unix_epoch(receive_sign_event.timestamp),
                first_seven_base64_chars(&receive_sign_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_sign_event.sign.block_hash.bytes()),
                receive_sign_event.sign.height,
                receive_sign_event.sign.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_commit_event: &ReceiveCommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_COMMIT,
                secs_since_unix_epoch(receive_commit_event.timestamp),
                first_seven_base64_chars(&receive_commit_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_commit_event.commit.block_hash.bytes()),
                receive_commit_event.commit.height,
                receive_commit_event.commit.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_view_change_event: &ReceiveViewChangeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_VIEW_CHANGE,
                secs_since_unix_epoch(receive_view_change_event.timestamp),
                first_seven_base64_chars(&receive_view_change_event.origin.to_bytes()),
                receive_view_change_event.view_change.height,
                receive_view_change_event.view_change.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                start_view_event
                    .leader
                    .map(|leader| first_seven_base64_chars(&leader.to_bytes()))
                    .unwrap_or_default(),
                start_view_event.height,
                start_view_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                view_timeout_event.view,
                view_timeout_event.to_view,
                view_timeout_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
