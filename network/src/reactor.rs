//! The full-node event loop: two selectors (client-facing, neighbor-facing),
//! a staged mempool, an incoming-chain stack, block formation, gossip, and
//! longest-chain consensus.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use tinyledger_core::api::Api;
use tinyledger_core::domain::{Block, Chain, Transaction};
use tinyledger_core::{miner, validator};

use crate::connection::{ClientConnection, ClientEvent, NeighborConnection, NeighborEvent};
use crate::error::NetworkError;

const CLIENT_LISTENER: Token = Token(0);
const NEIGHBOR_LISTENER: Token = Token(0);

/// Addresses and batching parameters a reactor needs at startup.
pub struct ReactorConfig {
    pub client_listen_addr: SocketAddr,
    pub neighbor_listen_addr: SocketAddr,
    pub neighbor_peer_addr: SocketAddr,
    pub formation_threshold: usize,
}

/// The full-node reactor: owns both listeners, both selectors, and all
/// live connection state. Mining runs inline on this thread, so no other
/// work is processed while a block is being mined.
pub struct FullNodeReactor {
    api: Api,
    config: ReactorConfig,
    client_poll: Poll,
    neighbor_poll: Poll,
    client_listener: TcpListener,
    neighbor_listener: TcpListener,
    clients: HashMap<Token, (TcpStream, ClientConnection)>,
    neighbors: HashMap<Token, (TcpStream, NeighborConnection)>,
    mempool: Vec<Transaction>,
    incoming_chains: Vec<Chain>,
    next_token: usize,
}

fn other_io_error(message: &str) -> NetworkError {
    NetworkError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

impl FullNodeReactor {
    pub fn bind(api: Api, config: ReactorConfig) -> Result<Self, NetworkError> {
        let mut client_listener = TcpListener::bind(config.client_listen_addr)?;
        let mut neighbor_listener = TcpListener::bind(config.neighbor_listen_addr)?;

        let client_poll = Poll::new()?;
        let neighbor_poll = Poll::new()?;
        client_poll
            .registry()
            .register(&mut client_listener, CLIENT_LISTENER, Interest::READABLE)?;
        neighbor_poll
            .registry()
            .register(&mut neighbor_listener, NEIGHBOR_LISTENER, Interest::READABLE)?;

        Ok(Self {
            api,
            config,
            client_poll,
            neighbor_poll,
            client_listener,
            neighbor_listener,
            clients: HashMap::new(),
            neighbors: HashMap::new(),
            mempool: Vec::new(),
            incoming_chains: Vec::new(),
            next_token: 1,
        })
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Runs the reactor until an I/O error terminates it. A caller that
    /// wants graceful shutdown on a signal should wrap this in a thread and
    /// interrupt it externally; this loop itself does not check for one.
    pub fn run(&mut self) -> Result<(), NetworkError> {
        loop {
            self.poll_clients_once()?;
            self.poll_neighbors_once()?;
        }
    }

    fn poll_clients_once(&mut self) -> Result<(), NetworkError> {
        let mut events = Events::with_capacity(128);
        self.client_poll.poll(&mut events, Some(Duration::from_secs(1)))?;
        let tokens: Vec<Token> = events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == CLIENT_LISTENER {
                self.accept_clients()?;
            } else {
                self.drive_client(token)?;
            }
        }
        Ok(())
    }

    fn accept_clients(&mut self) -> Result<(), NetworkError> {
        loop {
            match self.client_listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = self.alloc_token();
                    self.client_poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    self.clients.insert(token, (stream, ClientConnection::new()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drive_client(&mut self, token: Token) -> Result<(), NetworkError> {
        let outcome = match self.clients.get_mut(&token) {
            Some((stream, conn)) => conn.step(stream),
            None => return Ok(()),
        };
        match outcome {
            Ok(ClientEvent::NeedsMore) => Ok(()),
            Ok(ClientEvent::TransactionReceived(tx)) => {
                self.close_client(token)?;
                self.mempool.push(tx);
                self.maybe_form_block()
            }
            Ok(ClientEvent::DbRequestPending) => {
                let chain = self.api.chain().map_err(|_| other_io_error("chain read failed"))?;
                let chain_bytes = bincode::serialize(&chain)?;
                if let Some((stream, conn)) = self.clients.get_mut(&token) {
                    conn.begin_response(chain_bytes);
                    self.client_poll.registry().reregister(stream, token, Interest::WRITABLE)?;
                }
                Ok(())
            }
            Ok(ClientEvent::ResponseSent) | Ok(ClientEvent::Closed) => self.close_client(token),
            Err(e) => {
                tracing::warn!(error = %e, "client connection failed");
                self.close_client(token)
            }
        }
    }

    fn close_client(&mut self, token: Token) -> Result<(), NetworkError> {
        if let Some((mut stream, _)) = self.clients.remove(&token) {
            let _ = self.client_poll.registry().deregister(&mut stream);
        }
        Ok(())
    }

    /// Assembles a block from the staged mempool once it reaches the
    /// configured threshold, mines and validates it, and gossips the chain
    /// whether or not the batch was accepted (dropping it on failure).
    ///
    /// Mining runs before validation here, not after: `validate_block` folds
    /// the difficulty check into its block-level checks, so a block that
    /// hasn't been mined yet would always fail that check and never reach
    /// the mint/append path. See the 5th Open Question resolution in
    /// DESIGN.md.
    fn maybe_form_block(&mut self) -> Result<(), NetworkError> {
        if self.mempool.len() < self.config.formation_threshold {
            return Ok(());
        }
        let batch: Vec<Transaction> = self.mempool.drain(..).collect();
        let candidate = Block::new(0, String::new(), batch);

        tracing::info!(count = candidate.contents.len(), "mining block from staged transactions");
        let mined = match miner::mine_block(&self.api, candidate) {
            Ok(mined) => mined,
            Err(e) => {
                tracing::warn!(error = %e, "mining failed, dropping batch");
                return self.gossip();
            }
        };

        match validator::validate_block(&self.api, &mined) {
            Ok(()) => match self.api.append_block(mined) {
                Ok(appended) => tracing::info!(id = appended.header.id, "appended new block"),
                Err(e) => tracing::warn!(error = %e, "failed to append mined block"),
            },
            Err(e) => tracing::warn!(error = %e, "formed block failed validation, dropping batch"),
        }

        self.gossip()
    }

    /// Opens an outbound connection to the configured neighbor and gossips
    /// the current chain, regardless of whether the last batch formed a
    /// valid block.
    fn gossip(&mut self) -> Result<(), NetworkError> {
        let chain = self.api.chain().map_err(|_| other_io_error("chain read failed"))?;
        let chain_bytes = bincode::serialize(&chain)?;
        let mut stream = TcpStream::connect(self.config.neighbor_peer_addr)?;
        let token = self.alloc_token();
        self.neighbor_poll.registry().register(&mut stream, token, Interest::WRITABLE)?;
        self.neighbors.insert(token, (stream, NeighborConnection::sender(chain_bytes)));
        Ok(())
    }

    fn poll_neighbors_once(&mut self) -> Result<(), NetworkError> {
        let mut events = Events::with_capacity(128);
        self.neighbor_poll.poll(&mut events, Some(Duration::from_millis(0)))?;
        let tokens: Vec<Token> = events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == NEIGHBOR_LISTENER {
                self.accept_neighbors()?;
            } else {
                self.drive_neighbor(token)?;
            }
        }
        Ok(())
    }

    fn accept_neighbors(&mut self) -> Result<(), NetworkError> {
        loop {
            match self.neighbor_listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = self.alloc_token();
                    self.neighbor_poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    self.neighbors.insert(token, (stream, NeighborConnection::receiver()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drive_neighbor(&mut self, token: Token) -> Result<(), NetworkError> {
        let outcome = match self.neighbors.get_mut(&token) {
            Some((stream, conn)) => conn.step(stream),
            None => return Ok(()),
        };
        match outcome {
            Ok(NeighborEvent::NeedsMore) => Ok(()),
            Ok(NeighborEvent::DatabaseReceived(chain)) => {
                self.close_neighbor(token)?;
                self.incoming_chains.push(chain);
                self.maybe_replace_chain()
            }
            Ok(NeighborEvent::DatabaseSent) => {
                self.mempool.clear();
                self.close_neighbor(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "neighbor connection failed");
                self.close_neighbor(token)
            }
        }
    }

    fn close_neighbor(&mut self, token: Token) -> Result<(), NetworkError> {
        if let Some((mut stream, _)) = self.neighbors.remove(&token) {
            let _ = self.neighbor_poll.registry().deregister(&mut stream);
        }
        Ok(())
    }

    /// Replaces the local chain if the single most-recently received
    /// neighbor chain is strictly longer; drops the stack either way.
    fn maybe_replace_chain(&mut self) -> Result<(), NetworkError> {
        if self.incoming_chains.is_empty() {
            return Ok(());
        }
        let candidate = self.incoming_chains.remove(0);
        let local = self.api.chain().map_err(|_| other_io_error("chain read failed"))?;
        if candidate.len() > local.len() {
            self.api
                .store()
                .write(&candidate)
                .map_err(|_| other_io_error("chain write failed"))?;
            tracing::info!(len = candidate.len(), "replaced local chain with longer neighbor chain");
        }
        self.incoming_chains.clear();
        Ok(())
    }
}
