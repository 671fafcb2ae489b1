/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

use ed25519_dalek::VerifyingKey;

use crate::{
    pbft::messages::PBFTMessage,
    types::data_types::{BlockHeight, BufferSize},
};

use super::network::Network;

/// Spawn the poller thread, which polls the [`Network`] for messages, decodes them into
/// [`PBFTMessage`]s, and forwards them to the algorithm thread.
///
/// Messages whose payload cannot be decoded are dropped here, so that decoding never occupies the
/// algorithm thread.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<(VerifyingKey, PBFTMessage)>) {
    let (to_pbft_msg_receiver, pbft_msg_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            match PBFTMessage::try_from(&msg) {
                Ok(pbft_msg) => {
                    let _ = to_pbft_msg_receiver.send((origin, pbft_msg));
                }
                Err(err) => log::debug!(
                    "Dropped undecodable {:?} packet: {}",
                    err.packet_type,
                    err.reason
                ),
            }
        } else {
            thread::yield_now()
        }
    });
    (poller_thread, pbft_msg_receiver)
}

/// A receiving end for [`PBFTMessage`]s.
///
/// ## Height-aware buffering
///
/// `PBFTMessageStub` inspects incoming messages' heights to decide whether to:
/// 1. Return it from `recv` for immediate processing, if it is for the current height or an earlier one.
///    Messages for earlier heights are still returned, so that the engine can record in its broadcast
///    filter that the sender already has them.
/// 2. Place it in its buffer for processing once the engine reaches its height, if it is for a future
///    height. This keeps validators that finish a height slightly later than others from losing the
///    first messages of the next height.
///
/// ## Buffer management
///
/// If the message buffer grows beyond the capacity specified in [`new`](Self::new), some
/// future-height messages are removed from the buffer to make space for the new message, highest
/// heights first. A capacity of 0 disables buffering entirely.
pub(crate) struct PBFTMessageStub {
    receiver: Receiver<(VerifyingKey, PBFTMessage)>,
    msg_buffer: PBFTMessageBuffer,
}

impl PBFTMessageStub {
    /// Create a fresh [PBFTMessageStub] with a given receiver end and buffer capacity.
    pub(crate) fn new(
        receiver: Receiver<(VerifyingKey, PBFTMessage)>,
        msg_buffer_capacity: BufferSize,
    ) -> PBFTMessageStub {
        Self {
            receiver,
            msg_buffer: PBFTMessageBuffer::new(msg_buffer_capacity),
        }
    }

    /// Receive a message for `cur_height` or below, waiting until `deadline` at the latest. Messages for
    /// higher heights that arrive in the meantime are buffered.
    pub(crate) fn recv(
        &mut self,
        cur_height: BlockHeight,
        deadline: Instant,
    ) -> Result<(VerifyingKey, PBFTMessage), PBFTMessageReceiveError> {
        // Clear buffer of messages with heights lower than the current one.
        self.msg_buffer.remove_expired_msgs(cur_height);

        // Try to get buffered messages for the current height.
        if let Some((sender, msg)) = self.msg_buffer.get_msg(&cur_height) {
            return Ok((sender, msg));
        }

        // Try to get messages from the poller.
        while Instant::now() < deadline {
            match self.receiver.recv_timeout(deadline - Instant::now()) {
                Ok((sender, msg)) => {
                    if msg.height() > cur_height {
                        self.msg_buffer.insert(msg, sender);
                    } else {
                        return Ok((sender, msg));
                    }
                }
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PBFTMessageReceiveError::Disconnected)
                }
            }
        }

        Err(PBFTMessageReceiveError::Timeout)
    }
}

#[derive(Debug)]
pub(crate) enum PBFTMessageReceiveError {
    Timeout,
    Disconnected,
}

/// Message buffer for storing received [`PBFTMessage`]s for future heights.
///
/// Its size is bounded by its capacity, and when the capacity is reached messages for the highest
/// heights may be removed.
struct PBFTMessageBuffer {
    buffer_capacity: BufferSize,
    buffer: BTreeMap<BlockHeight, VecDeque<(VerifyingKey, PBFTMessage)>>,
    buffer_size: BufferSize,
}

impl PBFTMessageBuffer {
    fn new(buffer_capacity: BufferSize) -> Self {
        Self {
            buffer_capacity,
            buffer: BTreeMap::new(),
            buffer_size: BufferSize::new(0),
        }
    }

    /// Try inserting the message into the buffer.
    ///
    /// In case caching the message makes the buffer grow beyond its capacity, this function either:
    /// 1. If the message has the highest height among the messages currently in the buffer, drops it, or
    /// 2. Otherwise, removes just enough highest-height messages to make space for the new message.
    ///
    /// Returns whether the message was inserted.
    fn insert(&mut self, msg: PBFTMessage, sender: VerifyingKey) -> bool {
        let bytes_requested = mem::size_of::<VerifyingKey>() as u64 + msg.size();
        if bytes_requested > self.buffer_capacity.int() {
            return false;
        }

        let buffer_will_be_overloaded = self
            .buffer_size
            .int()
            .checked_add(bytes_requested)
            .map_or(true, |new_size| new_size > self.buffer_capacity.int());
        let below_highest_buffered = self
            .buffer
            .keys()
            .next_back()
            .is_some_and(|max_height| msg.height() < *max_height);

        if buffer_will_be_overloaded {
            if !below_highest_buffered {
                return false;
            }
            self.remove_highest_msgs(bytes_requested);
        }

        self.buffer_size += bytes_requested;
        self.buffer
            .entry(msg.height())
            .or_default()
            .push_back((sender, msg));
        true
    }

    /// If there are messages for this height in the buffer, remove and return the message at the front
    /// of the queue.
    fn get_msg(&mut self, height: &BlockHeight) -> Option<(VerifyingKey, PBFTMessage)> {
        let (sender, msg) = self.buffer.get_mut(height)?.pop_front()?;
        self.buffer_size -= mem::size_of::<VerifyingKey>() as u64 + msg.size();
        if self.buffer.get(height).is_some_and(|queue| queue.is_empty()) {
            self.buffer.remove(height);
        }
        Some((sender, msg))
    }

    /// Remove messages, highest heights first, until at least `bytes_to_remove` bytes are freed.
    fn remove_highest_msgs(&mut self, bytes_to_remove: u64) {
        let verifying_key_size = mem::size_of::<VerifyingKey>() as u64;
        let mut bytes_removed = 0;

        while bytes_removed < bytes_to_remove {
            let Some(mut highest) = self.buffer.last_entry() else {
                break;
            };
            match highest.get_mut().pop_back() {
                Some((_, msg)) => bytes_removed += msg.size() + verifying_key_size,
                None => {
                    highest.remove();
                    continue;
                }
            }
            if highest.get().is_empty() {
                highest.remove();
            }
        }

        self.buffer_size -= bytes_removed;
    }

    /// Remove all messages for heights less than the current height.
    fn remove_expired_msgs(&mut self, cur_height: BlockHeight) {
        let retained = self.buffer.split_off(&cur_height);
        let verifying_key_size = mem::size_of::<VerifyingKey>() as u64;
        let bytes_removed: u64 = self
            .buffer
            .values()
            .flatten()
            .map(|(_, msg)| msg.size() + verifying_key_size)
            .sum();
        self.buffer_size -= bytes_removed;
        self.buffer = retained;
    }

    fn len(&self) -> usize {
        self.buffer.values().map(VecDeque::len).sum()
    }
}
