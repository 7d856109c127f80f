//! The registry of available clients.

use std::{fmt, sync::Arc};

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{client::ClientProxy, partition::ClientId};

/// What a client sample is drawn for.
///
/// Fit and evaluate samples of the same round are drawn from independent streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Fit = 0,
    Evaluate = 1,
}

/// Keeps track of the available clients and samples them per round.
#[derive(Clone)]
pub struct ClientManager {
    clients: Vec<Arc<dyn ClientProxy>>,
    seed: u64,
}

impl fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("clients", &self.ids())
            .field("seed", &self.seed)
            .finish()
    }
}

impl ClientManager {
    /// Creates a manager. The `seed` makes the sampling reproducible.
    pub fn new(seed: u64) -> Self {
        Self {
            clients: Vec::new(),
            seed,
        }
    }

    /// Registers a client.
    pub fn register(&mut self, client: Arc<dyn ClientProxy>) {
        self.clients.push(client);
    }

    /// Gets the number of available clients.
    pub fn num_available(&self) -> usize {
        self.clients.len()
    }

    /// Gets the ids of the available clients in registration order.
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|client| client.id()).collect()
    }

    /// Samples `num` distinct clients, or all clients if fewer are available.
    ///
    /// The sample only depends on the seed, the round and the purpose. The sampled clients are
    /// ordered by id.
    pub fn sample(&self, num: usize, round: u64, purpose: Purpose) -> Vec<Arc<dyn ClientProxy>> {
        let mut prng = ChaCha20Rng::seed_from_u64(self.seed);
        prng.set_stream(round << 1 | purpose as u64);
        let mut sample = self
            .clients
            .choose_multiple(&mut prng, num.min(self.clients.len()))
            .cloned()
            .collect::<Vec<_>>();
        sample.sort_by_key(|client| client.id());
        sample
    }
}

impl<C: ClientProxy + 'static> std::iter::FromIterator<C> for ClientManager {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        let mut manager = Self::new(0);
        iter.into_iter()
            .for_each(|client| manager.register(Arc::new(client)));
        manager
    }
}
