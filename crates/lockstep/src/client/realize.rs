use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::log_target::LogTarget;
use crate::net::{DatagramTransport, JoinGameRequest};

use super::config::ClientConfig;
use super::session::ClientSession;
use super::state::{JoinPhase, SessionState};

const NORMAL_TARGET_FPS: usize = 60;
const CATCH_UP_TARGET_FPS: usize = 70;
const CATCH_UP_WAITING_STEPS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealizeState {
    Init,
    ReInit,
    Cleared,
    Synced,
    Disconnected,
}

impl fmt::Display for RealizeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ReInit => "reinit",
            Self::Cleared => "cleared",
            Self::Synced => "synced",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Drives a [`ClientSession`] towards the state the application asked for.
pub struct Realize<T> {
    log: LogTarget,
    session: ClientSession<T>,
    target: RealizeState,
    state: RealizeState,
    next_nonce: u64,
}

impl<T: DatagramTransport> Realize<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let session = ClientSession::new(config, transport);
        Self {
            log: session.log_target().child("realize"),
            session,
            target: RealizeState::Init,
            state: RealizeState::Init,
            next_nonce: 1,
        }
    }

    /// Starts over on the same transport and configuration.
    pub fn reinit(&mut self) {
        self.session.reset();
        self.target = RealizeState::Init;
        self.state = RealizeState::ReInit;
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.state = RealizeState::Cleared;
    }

    pub fn join_game(&mut self, local_indices: Vec<u8>) {
        let nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.wrapping_add(1);

        self.session.assign_join_request(JoinGameRequest {
            nonce,
            local_indices,
        });

        // A cleared session is never ticked, so leave cleared before aiming for synced.
        if self.state == RealizeState::Cleared {
            self.state = RealizeState::Init;
        }
        self.target = RealizeState::Synced;
        log::debug!(target: self.log.as_str(), "target is now {}", self.target);
    }

    pub fn quit_game(&mut self) {
        self.session.disconnect();
        self.target = RealizeState::Cleared;
        log::debug!(target: self.log.as_str(), "target is now {}", self.target);
    }

    pub fn update(&mut self, now_ms: u64) -> Result<(), ClientError> {
        if self.session.state() == SessionState::Disconnected {
            if self.state != RealizeState::Disconnected {
                log::warn!(
                    target: self.log.as_str(),
                    "session disconnected ({})",
                    self.session.quality().disconnect_reason()
                );
            }
            self.state = RealizeState::Disconnected;
            return Ok(());
        }

        if self.state != RealizeState::Cleared && self.target != RealizeState::Init {
            self.session.update(now_ms)?;
        }

        if self.state == self.target {
            return Ok(());
        }

        match self.target {
            RealizeState::Synced => match self.session.state() {
                SessionState::Idle => self.session.request_connect(),
                SessionState::Connected => self.session.begin_join(),
                SessionState::Synced => {
                    log::info!(target: self.log.as_str(), "reached {}", RealizeState::Synced);
                    self.state = RealizeState::Synced;
                }
                _ => {}
            },
            RealizeState::Cleared => self.state = RealizeState::Cleared,
            RealizeState::Init | RealizeState::ReInit | RealizeState::Disconnected => {}
        }

        Ok(())
    }

    /// Advisory tick rate; faster while authoritative steps pile up.
    pub fn target_fps(&self) -> usize {
        if self.session.authoritative_step_count() > CATCH_UP_WAITING_STEPS {
            CATCH_UP_TARGET_FPS
        } else {
            NORMAL_TARGET_FPS
        }
    }

    pub fn state(&self) -> RealizeState {
        self.state
    }

    pub fn target(&self) -> RealizeState {
        self.target
    }

    pub fn join_phase(&self) -> JoinPhase {
        self.session.join_phase()
    }

    pub fn session(&self) -> &ClientSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession<T> {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::net::Command;

    #[derive(Default)]
    struct SilentTransport {
        sent: Vec<Vec<u8>>,
    }

    impl DatagramTransport for SilentTransport {
        fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
            self.sent.push(datagram.to_vec());
            Ok(())
        }

        fn receive(&mut self, _buffer: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    fn realize() -> Realize<SilentTransport> {
        Realize::new(ClientConfig::default(), SilentTransport::default())
    }

    #[test]
    fn test_nothing_happens_without_a_target() {
        let mut realize = realize();
        realize.update(0).unwrap();
        realize.update(16).unwrap();
        assert_eq!(realize.state(), RealizeState::Init);
        assert_eq!(realize.session().state(), SessionState::Idle);
        assert!(realize.session().transport().sent.is_empty());
    }

    #[test]
    fn test_join_game_starts_connecting() {
        let mut realize = realize();
        realize.join_game(vec![0]);
        realize.update(0).unwrap();
        assert_eq!(realize.session().state(), SessionState::RequestingConnect);

        realize.update(16).unwrap();
        let sent = &realize.session().transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][5], Command::ConnectRequest as u8);
        assert_eq!(realize.target(), RealizeState::Synced);
    }

    #[test]
    fn test_join_nonce_increments() {
        let mut realize = realize();
        realize.join_game(vec![0]);
        let first = realize.session().join_request.as_ref().map(|r| r.nonce);
        realize.join_game(vec![0, 1]);
        let second = realize.session().join_request.as_ref().map(|r| r.nonce);
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }

    #[test]
    fn test_join_request_is_clamped() {
        let mut realize = realize();
        realize.join_game((0..12).collect());
        let indices = realize
            .session()
            .join_request
            .as_ref()
            .map(|r| r.local_indices.clone());
        assert_eq!(indices, Some((0..8).collect::<Vec<u8>>()));
    }

    #[test]
    fn test_quit_game_collapses_to_disconnected() {
        let mut realize = realize();
        realize.join_game(vec![0]);
        realize.update(0).unwrap();
        realize.quit_game();
        realize.update(16).unwrap();
        assert_eq!(realize.state(), RealizeState::Disconnected);
        assert_eq!(realize.target(), RealizeState::Cleared);
    }

    #[test]
    fn test_reset_clears_and_join_resumes() {
        let mut realize = realize();
        realize.join_game(vec![0]);
        realize.update(0).unwrap();
        realize.reset();
        assert_eq!(realize.state(), RealizeState::Cleared);
        assert_eq!(realize.session().state(), SessionState::Idle);

        realize.join_game(vec![0]);
        realize.update(16).unwrap();
        assert_eq!(realize.session().state(), SessionState::RequestingConnect);
    }

    #[test]
    fn test_reinit() {
        let mut realize = realize();
        realize.join_game(vec![0]);
        realize.update(0).unwrap();
        realize.reinit();
        assert_eq!(realize.state(), RealizeState::ReInit);
        assert_eq!(realize.target(), RealizeState::Init);
        assert_eq!(realize.session().state(), SessionState::Idle);
        assert_eq!(realize.target_fps(), NORMAL_TARGET_FPS);
    }
}
