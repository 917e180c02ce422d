use crate::error::ClientError;
use crate::log_target::LogTarget;
use crate::net::{
    Command, ConnectionSecret, DatagramTransport, InStream, JoinGameRequest, MAX_DATAGRAM_SIZE,
    MAX_LOCAL_PARTICIPANTS, MIN_HEADER_SIZE, OUT_OF_BAND_CONNECTION_ID, OrderedDatagramIn,
    OrderedDatagramOut, PONG_MARKER, ParticipantEntry, verify_integrity_tag,
};
use crate::stats::{MovingAverage, NetworkStats, PerSecond};
use crate::steps::{PendingSteps, StepBuffer, StepId};

use super::config::ClientConfig;
use super::lagometer::Lagometer;
use super::quality::ConnectionQuality;
use super::snapshot::{GameStateSnapshot, StateDownload};
use super::state::{JoinPhase, SessionState};
use super::step_exchange::{StepExchange, optimal_prediction_tick_count};

const AUTHORITATIVE_STEP_CAPACITY: usize = 128;
const STATS_LOG_INTERVAL_TICKS: u64 = 601;
const RATE_PERIOD_MS: u64 = 1000;

/// Reconstructs a full timestamp from its lower 16 bits, assuming it lies at or before `now_ms`.
pub(super) fn latency_from_lower_bits(now_ms: u64, lower_bits: u16) -> Option<u64> {
    let mut sent_at = (now_ms & !0xFFFF) | lower_bits as u64;
    if sent_at > now_ms {
        sent_at = sent_at.checked_sub(0x1_0000)?;
    }
    Some(now_ms - sent_at)
}

#[derive(Debug)]
pub(super) struct SessionMetrics {
    pub waiting_authoritative_steps: MovingAverage,
    pub server_incoming_buffer: MovingAverage,
    pub buffer_delta: MovingAverage,
    pub latency_ms: MovingAverage,
    pub outgoing_queue: MovingAverage,
    pub tick_duration_ms: MovingAverage,
    pub datagrams_in: PerSecond,
    pub datagrams_out: PerSecond,
    pub authoritative_steps_in: PerSecond,
}

impl SessionMetrics {
    fn new(now_ms: u64) -> Self {
        Self {
            waiting_authoritative_steps: MovingAverage::new(60),
            server_incoming_buffer: MovingAverage::new(10),
            buffer_delta: MovingAverage::new(10),
            latency_ms: MovingAverage::new(10),
            outgoing_queue: MovingAverage::new(60),
            tick_duration_ms: MovingAverage::new(30),
            datagrams_in: PerSecond::new(now_ms, RATE_PERIOD_MS),
            datagrams_out: PerSecond::new(now_ms, RATE_PERIOD_MS),
            authoritative_steps_in: PerSecond::new(now_ms, RATE_PERIOD_MS),
        }
    }

    fn update(&mut self, now_ms: u64) {
        self.datagrams_in.update(now_ms);
        self.datagrams_out.update(now_ms);
        self.authoritative_steps_in.update(now_ms);
    }
}

/// Client side of one lock-step session against a single server.
///
/// Poll driven: call [`ClientSession::update`] once per tick. All received datagrams are
/// handled first, then at most one step datagram and one control datagram are sent.
pub struct ClientSession<T> {
    pub(super) log: LogTarget,
    pub(super) config: ClientConfig,
    pub(super) transport: T,
    pub(super) state: SessionState,
    pub(super) join_phase: JoinPhase,
    pub(super) join_request: Option<JoinGameRequest>,
    pub(super) participants: Vec<ParticipantEntry>,
    pub(super) participant_connection_index: Option<u8>,
    pub(super) session_secret: Option<u64>,
    pub(super) connection_id: Option<u8>,
    pub(super) connection_secret: ConnectionSecret,
    pub(super) use_debug_streams: bool,
    pub(super) ordered_out: OrderedDatagramOut,
    pub(super) ordered_in: OrderedDatagramIn,
    pub(super) predicted: StepBuffer,
    pub(super) pending: PendingSteps,
    pub(super) authoritative: StepBuffer,
    pub(super) exchange: StepExchange,
    pub(super) download: Option<StateDownload>,
    pub(super) client_request_id: u8,
    pub(super) snapshot: Option<GameStateSnapshot>,
    pub(super) quality: ConnectionQuality,
    pub(super) wait_ticks: u32,
    pub(super) now_ms: u64,
    pub(super) last_tick_ms: Option<u64>,
    pub(super) tick_count: u64,
    pub(super) latency_ms: Option<u64>,
    pub(super) stats: NetworkStats,
    pub(super) metrics: SessionMetrics,
    pub(super) lagometer: Lagometer,
}

impl<T: DatagramTransport> ClientSession<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let config = config.sanitized();
        let log = LogTarget::new(&config.log_target);
        let max_predicted_steps = config.max_predicted_steps;

        log::debug!(
            target: log.as_str(),
            "session created for application {} ({} participants, {} octets per step)",
            config.application_version,
            config.max_participants,
            config.max_step_octets()
        );

        Self {
            quality: ConnectionQuality::new(log.child("quality")),
            log,
            config,
            transport,
            state: SessionState::Idle,
            join_phase: JoinPhase::JoiningParticipant,
            join_request: None,
            participants: Vec::new(),
            participant_connection_index: None,
            session_secret: None,
            connection_id: None,
            connection_secret: 0,
            use_debug_streams: false,
            ordered_out: OrderedDatagramOut::new(),
            ordered_in: OrderedDatagramIn::new(),
            predicted: StepBuffer::new(0, max_predicted_steps),
            pending: PendingSteps::new(0),
            authoritative: StepBuffer::new(0, AUTHORITATIVE_STEP_CAPACITY),
            exchange: StepExchange::new(0),
            download: None,
            client_request_id: 0,
            snapshot: None,
            wait_ticks: 0,
            now_ms: 0,
            last_tick_ms: None,
            tick_count: 0,
            latency_ms: None,
            stats: NetworkStats::default(),
            metrics: SessionMetrics::new(0),
            lagometer: Lagometer::default(),
        }
    }

    /// Forgets the connection and everything learned from the server. Configuration and transport stay.
    pub fn reset(&mut self) {
        log::debug!(target: self.log.as_str(), "reset from state {}", self.state);

        self.state = SessionState::Idle;
        self.join_phase = JoinPhase::JoiningParticipant;
        self.join_request = None;
        self.participants.clear();
        self.participant_connection_index = None;
        self.session_secret = None;
        self.connection_id = None;
        self.connection_secret = 0;
        self.use_debug_streams = false;
        self.ordered_out = OrderedDatagramOut::new();
        self.ordered_in = OrderedDatagramIn::new();
        self.predicted.reinit(0);
        self.pending.reset(0);
        self.authoritative.reinit(0);
        self.exchange.reset(0);
        self.download = None;
        self.client_request_id = self.client_request_id.wrapping_add(1);
        self.snapshot = None;
        self.quality.reset();
        self.wait_ticks = 0;
        self.last_tick_ms = None;
        self.tick_count = 0;
        self.latency_ms = None;
        self.stats = NetworkStats::default();
        self.metrics = SessionMetrics::new(self.now_ms);
        self.lagometer.clear();
    }

    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            log::info!(target: self.log.as_str(), "disconnecting from state {}", self.state);
        }
        self.state = SessionState::Disconnected;
    }

    pub fn request_connect(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }
        log::debug!(target: self.log.as_str(), "requesting connect");
        self.state = SessionState::RequestingConnect;
        self.wait_ticks = 0;
    }

    pub fn begin_join(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        log::debug!(target: self.log.as_str(), "joining game");
        self.state = SessionState::JoiningRequestingState;
        self.join_phase = JoinPhase::JoiningParticipant;
        self.wait_ticks = 0;
    }

    /// Local indices past `MAX_LOCAL_PARTICIPANTS` are dropped.
    pub fn assign_join_request(&mut self, mut request: JoinGameRequest) {
        if request.local_indices.len() > MAX_LOCAL_PARTICIPANTS {
            log::warn!(
                target: self.log.as_str(),
                "join request for {} local participants, keeping the first {}",
                request.local_indices.len(),
                MAX_LOCAL_PARTICIPANTS
            );
            request.local_indices.truncate(MAX_LOCAL_PARTICIPANTS);
        }
        log::debug!(
            target: self.log.as_str(),
            "join request {:016X} for local participants {:?}",
            request.nonce,
            request.local_indices
        );
        self.join_request = Some(request);
    }

    pub fn update(&mut self, now_ms: u64) -> Result<(), ClientError> {
        self.track_tick_duration(now_ms);
        self.now_ms = now_ms;
        self.tick_count += 1;

        self.receive_all()?;

        if self.state == SessionState::Synced {
            self.quality.tick();
            if self.quality.should_disconnect() {
                log::warn!(
                    target: self.log.as_str(),
                    "disconnecting: {}",
                    self.quality.disconnect_reason()
                );
                self.state = SessionState::Disconnected;
                return Ok(());
            }
        }

        if self.wait_ticks > 0 {
            self.wait_ticks -= 1;
            if self.wait_ticks > 0 {
                return Ok(());
            }
        }

        self.metrics.update(now_ms);
        self.log_stats();

        self.send_outgoing()
    }

    fn track_tick_duration(&mut self, now_ms: u64) {
        if let Some(last_tick_ms) = self.last_tick_ms {
            let elapsed = now_ms.saturating_sub(last_tick_ms);
            self.metrics
                .tick_duration_ms
                .add(elapsed.min(i32::MAX as u64) as i32);
            let expected = self.config.expected_tick_duration_ms;
            if elapsed.abs_diff(expected) > self.config.tick_tolerance_ms {
                log::debug!(
                    target: self.log.as_str(),
                    "tick took {} ms, expected {} ms",
                    elapsed,
                    expected
                );
            }
        }
        self.last_tick_ms = Some(now_ms);
    }

    fn receive_all(&mut self) -> Result<usize, ClientError> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let mut count = 0;

        loop {
            let octet_count = match self.transport.receive(&mut buffer) {
                Ok(0) => break,
                Ok(octet_count) => octet_count,
                Err(err) => {
                    log::error!(target: self.log.as_str(), "receive failed: {}", err);
                    return Err(err.into());
                }
            };
            count += 1;

            match self.feed(&buffer[..octet_count]) {
                Ok(()) => {}
                Err(ClientError::DuplicateOrReordered(delta)) => {
                    log::debug!(
                        target: self.log.as_str(),
                        "dropped duplicate or reordered datagram (delta {})",
                        delta
                    );
                }
                Err(err) => {
                    log::warn!(target: self.log.as_str(), "dropped datagram: {}", err);
                }
            }
        }

        Ok(count)
    }

    /// Handles one received datagram. Errors mean the datagram was dropped; the session carries on.
    pub fn feed(&mut self, datagram: &[u8]) -> Result<(), ClientError> {
        self.stats.datagrams_received += 1;
        self.stats.octets_received += datagram.len() as u64;
        self.metrics.datagrams_in.add(1);

        let result = self.handle_datagram(datagram);
        if result.is_err() {
            self.stats.datagrams_rejected += 1;
        }
        result
    }

    fn handle_datagram(&mut self, datagram: &[u8]) -> Result<(), ClientError> {
        if datagram.len() < MIN_HEADER_SIZE {
            return Err(ClientError::TooShort(datagram.len()));
        }

        let mut stream = InStream::new(datagram);
        let connection_id = stream.read_u8()?;

        if connection_id == OUT_OF_BAND_CONNECTION_ID {
            return self.handle_out_of_band(&mut stream);
        }

        if self.connection_id != Some(connection_id) {
            return Err(ClientError::ForeignConnection {
                expected: self.connection_id,
                got: connection_id,
            });
        }

        if self.state == SessionState::Disconnected {
            return Err(ClientError::Disconnected);
        }

        let tag = stream.read_u32()?;
        if !verify_integrity_tag(self.connection_secret, tag, stream.rest()) {
            return Err(ClientError::IntegrityTag);
        }

        let delta = self.ordered_in.receive(&mut stream)?;
        if delta <= 0 {
            return Err(ClientError::DuplicateOrReordered(delta));
        }
        if delta > 1 {
            let lost = (delta - 1) as usize;
            self.quality.dropped_datagrams(lost);
            self.lagometer.dropped(lost);
            self.stats.datagrams_lost += lost as u64;
        }
        self.quality.received_usable_datagram();

        if stream.peek_u8()? == PONG_MARKER {
            stream.check_marker(PONG_MARKER)?;
            let echoed = stream.read_u16()?;
            self.on_echoed_timestamp(echoed);
        }

        let command_id = stream.read_u8()?;
        let command =
            Command::from_u8(command_id).ok_or(ClientError::UnknownCommand(command_id))?;
        log::trace!(target: self.log.as_str(), "received {:?}", command);

        self.handle_command(command, &mut stream)?;
        self.check_consumed(command, &stream);

        Ok(())
    }

    fn handle_out_of_band(&mut self, stream: &mut InStream) -> Result<(), ClientError> {
        let _sequence = stream.read_u16()?;
        let command_id = stream.read_u8()?;
        if Command::from_u8(command_id) != Some(Command::ConnectResponse) {
            return Err(ClientError::OutOfBandCommand(command_id));
        }

        self.handle_connect_response(stream)?;
        self.check_consumed(Command::ConnectResponse, stream);

        Ok(())
    }

    fn check_consumed(&self, command: Command, stream: &InStream) {
        if !stream.is_consumed() {
            log::warn!(
                target: self.log.as_str(),
                "{:?} left {} octets unread",
                command,
                stream.remaining()
            );
        }
    }

    pub(super) fn on_echoed_timestamp(&mut self, lower_bits: u16) {
        let Some(latency_ms) = latency_from_lower_bits(self.now_ms, lower_bits) else {
            log::debug!(
                target: self.log.as_str(),
                "echoed timestamp {:04X} is ahead of now",
                lower_bits
            );
            return;
        };

        self.latency_ms = Some(latency_ms);
        self.quality.game_step_latency(latency_ms);
        self.metrics
            .latency_ms
            .add(latency_ms.min(i32::MAX as u64) as i32);
    }

    fn log_stats(&self) {
        if self.tick_count % STATS_LOG_INTERVAL_TICKS != 0 {
            return;
        }

        let target = self.log.as_str();
        log::debug!(target: target, "waiting authoritative steps: {}", self.metrics.waiting_authoritative_steps);
        log::debug!(target: target, "server incoming buffer: {}", self.metrics.server_incoming_buffer);
        log::debug!(target: target, "authoritative buffer delta: {}", self.metrics.buffer_delta);
        log::debug!(target: target, "outgoing steps in queue: {}", self.metrics.outgoing_queue);
        log::debug!(target: target, "latency ms: {}", self.metrics.latency_ms);
        log::debug!(target: target, "tick duration ms: {}", self.metrics.tick_duration_ms);
        log::debug!(
            target: target,
            "datagrams in {}, out {}, authoritative steps in {}",
            self.metrics.datagrams_in,
            self.metrics.datagrams_out,
            self.metrics.authoritative_steps_in
        );
        log::debug!(target: target, "quality: {}", self.quality.describe());
    }

    /// Appends a locally predicted step at the next predicted id.
    pub fn write_predicted_step(&mut self, payload: &[u8]) -> Result<StepId, ClientError> {
        let limit = self.config.max_step_octets();
        if payload.len() > limit {
            return Err(ClientError::StepTooLarge {
                size: payload.len(),
                limit,
            });
        }
        if self.predicted.is_full() {
            return Err(ClientError::PredictedBufferFull);
        }

        let id = self.predicted.expected_write_id();
        self.predicted.write(id, payload)?;
        log::trace!(target: self.log.as_str(), "predicted step {:08X}", id);

        Ok(id)
    }

    pub fn can_write_predicted_step(&self) -> bool {
        !self.predicted.is_full()
    }

    pub fn read_authoritative_step(&mut self) -> Option<(StepId, Vec<u8>)> {
        let step = self.authoritative.read()?;

        if self.pending.stored_count() > 0 {
            if let Err(err) = self.pending.copy_completed_into(&mut self.authoritative) {
                log::warn!(target: self.log.as_str(), "could not move pending steps: {}", err);
            }
        }

        Some((step.id, step.payload))
    }

    pub fn authoritative_step_count(&self) -> usize {
        self.authoritative.len()
    }

    pub fn find_participant_id(&self, local_index: u8) -> Option<u8> {
        self.participants
            .iter()
            .find(|entry| entry.local_index == local_index)
            .map(|entry| entry.participant_id)
    }

    pub fn optimal_prediction_tick_count(&self) -> Option<usize> {
        optimal_prediction_tick_count(
            self.metrics.latency_ms.average(),
            self.metrics.buffer_delta.average(),
            self.config.expected_tick_duration_ms,
        )
    }

    /// The step id local prediction should be producing right now.
    pub fn optimal_step_id_to_send(&self) -> Option<StepId> {
        let ticks = self.optimal_prediction_tick_count()?;
        Some(
            self.authoritative
                .expected_write_id()
                .wrapping_add(ticks as StepId),
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn join_phase(&self) -> JoinPhase {
        self.join_phase
    }

    pub fn participants(&self) -> &[ParticipantEntry] {
        &self.participants
    }

    pub fn participant_connection_index(&self) -> Option<u8> {
        self.participant_connection_index
    }

    pub fn session_secret(&self) -> Option<u64> {
        self.session_secret
    }

    pub fn connection_id(&self) -> Option<u8> {
        self.connection_id
    }

    pub fn uses_debug_streams(&self) -> bool {
        self.use_debug_streams
    }

    pub fn snapshot(&self) -> Option<&GameStateSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn predicted_steps(&self) -> &StepBuffer {
        &self.predicted
    }

    pub fn authoritative_steps(&self) -> &StepBuffer {
        &self.authoritative
    }

    pub fn quality(&self) -> &ConnectionQuality {
        &self.quality
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    pub fn lagometer(&self) -> &Lagometer {
        &self.lagometer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn log_target(&self) -> &LogTarget {
        &self.log
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
