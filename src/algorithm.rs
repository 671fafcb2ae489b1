/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread, which drives the [`PBFTEngine`].
//!
//! The thread is a loop that alternates between:
//! 1. Receiving messages for the current height from the poller, and passing them to the engine, until
//!    the next tick is due.
//! 2. [Ticking](PBFTEngine::tick) the engine, so that it can time out views and propose blocks.
//!
//! Messages for heights above the current one are buffered by the [`PBFTMessageStub`] and handed to
//! the engine once it reaches their height.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    backup::BackupStore,
    ledger::Ledger,
    networking::{
        network::Network,
        receiving::{PBFTMessageReceiveError, PBFTMessageStub},
    },
    pbft::implementation::PBFTEngine,
};

pub(crate) struct Algorithm<N: Network + 'static, L: Ledger + 'static, B: BackupStore + 'static> {
    engine: PBFTEngine<N, L, B>,
    pbft_msg_stub: PBFTMessageStub,
    tick_interval: Duration,
    shutdown_signal: Receiver<()>,
}

impl<N: Network + 'static, L: Ledger + 'static, B: BackupStore + 'static> Algorithm<N, L, B> {
    pub(crate) fn new(
        engine: PBFTEngine<N, L, B>,
        pbft_msg_stub: PBFTMessageStub,
        tick_interval: Duration,
        shutdown_signal: Receiver<()>,
    ) -> Self {
        Self {
            engine,
            pbft_msg_stub,
            tick_interval,
            shutdown_signal,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || self.execute())
    }

    fn execute(&mut self) {
        let mut next_tick = Instant::now();
        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Algorithm thread disconnected from main thread")
                }
            }

            // 1. Tick if it is time to.
            if Instant::now() >= next_tick {
                if let Err(err) = self.engine.tick() {
                    panic!("PBFT engine failed on tick: {:?}", err)
                }
                next_tick = Instant::now() + self.tick_interval;
            }

            // 2. Process messages until the next tick.
            match self
                .pbft_msg_stub
                .recv(self.engine.consensus_height(), next_tick)
            {
                Ok((origin, msg)) => {
                    if let Err(err) = self.engine.on_receive_msg(&origin, msg) {
                        panic!("PBFT engine failed on message: {:?}", err)
                    }
                }
                Err(PBFTMessageReceiveError::Timeout) => (),
                Err(PBFTMessageReceiveError::Disconnected) => {
                    panic!("Algorithm thread disconnected from the poller")
                }
            }
        }
    }
}
