//! Establishing a trusted channel: obtaining the Card Access Number and running PACE.
//!
//! The Card Access Number is requested from a [`CardAccessNumberSupplier`], which answers through a
//! single-use [`CardAccessNumberResponder`] whenever it has the number available (e.g. once a user
//! has typed it in). The wait is bounded by [`NegotiationConfig::can_timeout`]. The handshake itself
//! is synchronous and runs on Tokio's blocking thread pool.


use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{CryptoRng, RngCore};
use rand::rngs::OsRng;
use tokio::select;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::iso7816::card::SmartCard;
use crate::pace::{CardAccessNumber, Error, PaceKey};
use crate::pace::exchange::negotiate_pace_key;


/// How long to wait for the Card Access Number by default.
pub const DEFAULT_CAN_TIMEOUT: Duration = Duration::from_secs(30);


/// Hands the Card Access Number to a waiting negotiation.
///
/// The responder can be used once. If the negotiation has stopped waiting (it timed out or was
/// cancelled), the number is handed back.
#[derive(Debug)]
pub struct CardAccessNumberResponder {
    sender: oneshot::Sender<CardAccessNumber>,
}
impl CardAccessNumberResponder {
    pub fn respond(self, can: CardAccessNumber) -> Result<(), CardAccessNumber> {
        self.sender.send(can)
    }

    /// Whether the negotiation has stopped waiting for an answer.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}


/// Something that can provide the Card Access Number when a negotiation needs it.
///
/// Implementations must not block; they should either answer immediately or pass the responder on
/// to whatever eventually obtains the number. Dropping the responder without answering aborts the
/// negotiation.
pub trait CardAccessNumberSupplier: Send + Sync + 'static {
    fn request_card_access_number(&self, responder: CardAccessNumberResponder);
}
impl<F> CardAccessNumberSupplier for F
where
    F: Fn(CardAccessNumberResponder) + Send + Sync + 'static,
{
    fn request_card_access_number(&self, responder: CardAccessNumberResponder) {
        self(responder)
    }
}


/// A Card Access Number that is known in advance.
#[derive(Clone, Debug)]
pub struct StaticCardAccessNumber {
    can: CardAccessNumber,
}
impl StaticCardAccessNumber {
    pub fn new(can: CardAccessNumber) -> Self {
        Self { can }
    }
}
impl CardAccessNumberSupplier for StaticCardAccessNumber {
    fn request_card_access_number(&self, responder: CardAccessNumberResponder) {
        if responder.respond(self.can.clone()).is_err() {
            debug!("negotiation stopped waiting before the static CAN was supplied");
        }
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NegotiationConfig {
    /// How long to wait for the supplier to provide the Card Access Number.
    pub can_timeout: Duration,
}
impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            can_timeout: DEFAULT_CAN_TIMEOUT,
        }
    }
}


/// The result of a negotiation along with the card, which is handed back in every case.
#[derive(Debug)]
pub struct NegotiationOutcome<C> {
    pub card: C,
    pub result: Result<PaceKey, Error>,
}


/// A random number generator shared between negotiations.
///
/// The lock is held only for a single draw.
struct SharedRng<R> {
    inner: Arc<Mutex<R>>,
}
impl<R: RngCore> RngCore for SharedRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.inner.lock().next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.lock().next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.lock().fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.lock().try_fill_bytes(dest)
    }
}
impl<R: CryptoRng> CryptoRng for SharedRng<R> {}


/// Resolves once cancellation has been requested; never resolves if the handle is dropped.
async fn cancellation(cancelled: &mut watch::Receiver<bool>) {
    let handle_dropped = cancelled.wait_for(|is_cancelled| *is_cancelled).await.is_err();
    if handle_dropped {
        pending::<()>().await
    }
}


/// Negotiates PACE keys with cards, asking a supplier for the Card Access Number each time.
pub struct TrustedChannelConstructor<S, R = OsRng> {
    supplier: Arc<S>,
    rng: Arc<Mutex<R>>,
    config: NegotiationConfig,
}
impl<S: CardAccessNumberSupplier> TrustedChannelConstructor<S, OsRng> {
    pub fn new(supplier: S) -> Self {
        Self::with_rng(supplier, OsRng)
    }
}
impl<S, R> TrustedChannelConstructor<S, R>
where
    S: CardAccessNumberSupplier,
    R: RngCore + CryptoRng + Send + 'static,
{
    pub fn with_rng(supplier: S, rng: R) -> Self {
        Self {
            supplier: Arc::new(supplier),
            rng: Arc::new(Mutex::new(rng)),
            config: NegotiationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NegotiationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &NegotiationConfig { &self.config }

    /// Obtains the Card Access Number and negotiates PACE keys with the card.
    pub async fn negotiate<C: SmartCard + Send + 'static>(&self, card: C) -> NegotiationOutcome<C> {
        // never cancelled
        let (_cancel, cancelled) = watch::channel(false);
        self.run(card, cancelled).await
    }

    /// Starts a negotiation in the background and calls `on_complete` exactly once with its
    /// outcome.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_pace_key<C, F>(&self, card: C, on_complete: F) -> NegotiationHandle
    where
        C: SmartCard + Send + 'static,
        F: FnOnce(NegotiationOutcome<C>) + Send + 'static,
    {
        let (cancel, cancelled) = watch::channel(false);
        let constructor = self.clone();
        let task = tokio::spawn(async move {
            let outcome = constructor.run(card, cancelled).await;
            on_complete(outcome);
        });
        NegotiationHandle { cancel, task }
    }

    #[instrument(skip_all)]
    async fn run<C: SmartCard + Send + 'static>(&self, card: C, mut cancelled: watch::Receiver<bool>) -> NegotiationOutcome<C> {
        let (sender, receiver) = oneshot::channel();
        debug!("requesting card access number");
        self.supplier.request_card_access_number(CardAccessNumberResponder { sender });

        let can = select! {
            biased;
            _ = cancellation(&mut cancelled) => {
                info!("negotiation cancelled while waiting for the card access number");
                return NegotiationOutcome { card, result: Err(Error::Cancelled) };
            },
            received = tokio::time::timeout(self.config.can_timeout, receiver) => match received {
                Ok(Ok(can)) => can,
                Ok(Err(_)) => {
                    warn!("card access number supplier gave up");
                    return NegotiationOutcome { card, result: Err(Error::CredentialUnavailable) };
                },
                Err(_) => {
                    warn!(timeout = ?self.config.can_timeout, "no card access number supplied in time");
                    return NegotiationOutcome { card, result: Err(Error::CredentialTimeout) };
                },
            },
        };

        let mut rng = SharedRng { inner: Arc::clone(&self.rng) };
        let handshake = tokio::task::spawn_blocking(move || {
            let mut card = card;
            let result = negotiate_pace_key(&mut card, &can, &mut rng);
            (card, result)
        });
        let (card, mut result) = match handshake.await {
            Ok(card_and_result) => card_and_result,
            Err(join_error) => std::panic::resume_unwind(join_error.into_panic()),
        };

        if *cancelled.borrow() {
            info!("negotiation cancelled during the handshake; discarding its result");
            result = Err(Error::Cancelled);
        }
        match &result {
            Ok(key) => info!(check_value = %crate::hex_dump(&key.check_value()), "trusted channel established"),
            Err(error) => warn!(%error, step = ?error.step(), "negotiation failed"),
        }
        NegotiationOutcome { card, result }
    }
}
impl<S, R> Clone for TrustedChannelConstructor<S, R> {
    fn clone(&self) -> Self {
        Self {
            supplier: Arc::clone(&self.supplier),
            rng: Arc::clone(&self.rng),
            config: self.config,
        }
    }
}


/// Controls a negotiation started with [`TrustedChannelConstructor::request_pace_key`].
///
/// Dropping the handle lets the negotiation run to completion.
#[derive(Debug)]
pub struct NegotiationHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}
impl NegotiationHandle {
    /// Requests cancellation.
    ///
    /// A negotiation still waiting for the Card Access Number stops immediately. A running
    /// handshake finishes its current command sequence, but its keys are discarded and the outcome
    /// is [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Waits until the completion callback has returned.
    pub async fn join(self) {
        if let Err(join_error) = self.task.await {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic());
            }
        }
    }
}
