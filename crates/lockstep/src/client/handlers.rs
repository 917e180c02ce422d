use crate::error::ClientError;
use crate::net::{
    Command, ConnectFlags, ConnectResponse, DatagramTransport, DownloadGameStateResponse,
    GameStepResponseHeader, InStream, JoinGameOutOfParticipantSlots, JoinGameResponse,
    MAX_LOCAL_PARTICIPANTS, OUT_OF_BAND_CONNECTION_ID, OrderedDatagramIn, read_step_run,
};
use crate::steps::PendingReceive;

use super::session::ClientSession;
use super::snapshot::StateDownload;
use super::state::{JoinPhase, SessionState};

impl<T: DatagramTransport> ClientSession<T> {
    pub(super) fn handle_command(
        &mut self,
        command: Command,
        stream: &mut InStream,
    ) -> Result<(), ClientError> {
        match command {
            Command::ConnectResponse => self.handle_connect_response(stream),
            Command::JoinGameResponse => self.handle_join_game_response(stream),
            Command::JoinGameOutOfParticipantSlots => self.handle_out_of_participant_slots(stream),
            Command::DownloadGameStateResponse => self.handle_download_game_state_response(stream),
            Command::GameStatePart => self.handle_game_state_part(stream),
            Command::GameStepResponse => self.handle_game_step_response(stream),
            Command::JoinGameRequest
            | Command::GameStep
            | Command::DownloadGameStateRequest
            | Command::DownloadGameStateStatus
            | Command::ConnectRequest => Err(ClientError::UnexpectedResponse(
                "client command received from server",
            )),
        }
    }

    pub(super) fn handle_connect_response(
        &mut self,
        stream: &mut InStream,
    ) -> Result<(), ClientError> {
        let response = ConnectResponse::read(stream)?;

        if self.state != SessionState::RequestingConnect {
            log::debug!(
                target: self.log.as_str(),
                "ignoring connect response in state {}",
                self.state
            );
            return Ok(());
        }

        if response.connection_id == OUT_OF_BAND_CONNECTION_ID {
            return Err(ClientError::UnexpectedResponse(
                "connect response without connection id",
            ));
        }

        self.connection_id = Some(response.connection_id);
        self.connection_secret = response.connection_secret;
        self.use_debug_streams = response.flags.contains(ConnectFlags::USE_DEBUG_STREAMS);
        self.ordered_in = OrderedDatagramIn::new();
        self.state = SessionState::Connected;
        self.wait_ticks = 0;

        log::info!(
            target: self.log.as_str(),
            "connected with connection id {} (debug streams: {})",
            response.connection_id,
            self.use_debug_streams
        );

        Ok(())
    }

    fn handle_join_game_response(&mut self, stream: &mut InStream) -> Result<(), ClientError> {
        let response = JoinGameResponse::read(stream)?;

        if self.join_phase != JoinPhase::JoiningParticipant {
            log::debug!(
                target: self.log.as_str(),
                "ignoring join response while {}",
                self.join_phase
            );
            return Ok(());
        }

        let expected_nonce = self.join_request.as_ref().map(|request| request.nonce);
        if expected_nonce != Some(response.nonce) {
            log::warn!(
                target: self.log.as_str(),
                "join response nonce {:016X} does not match request {:?}",
                response.nonce,
                expected_nonce
            );
            return Ok(());
        }

        let count = response.participants.len();
        if count > MAX_LOCAL_PARTICIPANTS || count > self.config.max_participants {
            return Err(ClientError::TooManyParticipants(count));
        }

        for entry in &response.participants {
            log::debug!(
                target: self.log.as_str(),
                "local participant {} is participant {}",
                entry.local_index,
                entry.participant_id
            );
        }

        self.participants = response.participants;
        self.participant_connection_index = Some(response.participant_connection_index);
        self.session_secret = Some(response.session_secret);
        self.join_phase = JoinPhase::JoinedParticipant;
        self.download = None;
        self.wait_ticks = 0;

        log::info!(
            target: self.log.as_str(),
            "joined game with {} participant(s) on connection index {}",
            count,
            response.participant_connection_index
        );

        Ok(())
    }

    fn handle_out_of_participant_slots(
        &mut self,
        stream: &mut InStream,
    ) -> Result<(), ClientError> {
        let message = JoinGameOutOfParticipantSlots::read(stream)?;

        log::warn!(
            target: self.log.as_str(),
            "server is out of participant slots (nonce {:016X})",
            message.nonce
        );
        self.join_phase = JoinPhase::OutOfParticipantSlots;

        Ok(())
    }

    fn handle_download_game_state_response(
        &mut self,
        stream: &mut InStream,
    ) -> Result<(), ClientError> {
        let response = DownloadGameStateResponse::read(stream)?;

        if self
            .download
            .as_ref()
            .is_some_and(|download| download.channel == response.channel)
        {
            log::debug!(
                target: self.log.as_str(),
                "download channel {:04X} is already known",
                response.channel
            );
            return Ok(());
        }

        if self.state != SessionState::JoiningRequestingState
            || self.join_phase != JoinPhase::JoinedParticipant
        {
            log::debug!(
                target: self.log.as_str(),
                "ignoring download response in state {} ({})",
                self.state,
                self.join_phase
            );
            return Ok(());
        }

        if response.client_request_id != self.client_request_id {
            return Err(ClientError::UnexpectedResponse(
                "download response for another request",
            ));
        }

        if response.octet_count as usize > self.config.max_snapshot_octets {
            log::warn!(
                target: self.log.as_str(),
                "game state of {} octets exceeds the limit of {}",
                response.octet_count,
                self.config.max_snapshot_octets
            );
            return Err(ClientError::UnexpectedResponse(
                "game state larger than allowed",
            ));
        }

        log::info!(
            target: self.log.as_str(),
            "downloading game state at step {:08X}, {} octets on channel {:04X}",
            response.step_id,
            response.octet_count,
            response.channel
        );

        self.download = Some(StateDownload::new(
            response.channel,
            response.step_id,
            response.octet_count as usize,
        ));
        self.predicted.reinit(response.step_id);
        self.exchange.reset(response.step_id);
        self.state = SessionState::JoiningDownloadingState;
        self.wait_ticks = 0;

        self.complete_download_if_done();

        Ok(())
    }

    fn handle_game_state_part(&mut self, stream: &mut InStream) -> Result<(), ClientError> {
        let channel = stream.read_u16()?;

        let Some(download) = self.download.as_mut() else {
            return Err(ClientError::UnexpectedResponse(
                "game state part without download",
            ));
        };
        if download.channel != channel {
            return Err(ClientError::UnexpectedResponse(
                "game state part on another channel",
            ));
        }

        download.blob.receive(stream)?;
        self.complete_download_if_done();

        Ok(())
    }

    fn complete_download_if_done(&mut self) {
        let Some(download) = self.download.as_ref() else {
            return;
        };
        if !download.blob.is_complete() {
            log::trace!(
                target: self.log.as_str(),
                "game state chunks waiting from {:?}",
                download.blob.ack()
            );
            return;
        }
        if self.state == SessionState::Synced {
            return;
        }
        let Some(snapshot) = download.snapshot() else {
            return;
        };

        let step_id = snapshot.step_id;
        self.predicted.reinit(step_id);
        self.exchange.reset(step_id);
        self.pending.reset(step_id);
        self.authoritative.reinit(step_id);
        self.quality.reset();

        log::info!(
            target: self.log.as_str(),
            "game state downloaded ({} octets at step {:08X}), synced",
            snapshot.octets.len(),
            step_id
        );

        self.snapshot = Some(snapshot);
        self.state = SessionState::Synced;
        self.wait_ticks = 0;
    }

    fn handle_game_step_response(&mut self, stream: &mut InStream) -> Result<(), ClientError> {
        let header = GameStepResponseHeader::read(stream)?;

        self.metrics
            .server_incoming_buffer
            .add(header.incoming_buffer_count as i32);
        self.metrics.buffer_delta.add(header.buffer_delta as i32);
        self.on_echoed_timestamp(header.echoed_timestamp);
        self.lagometer.received(self.latency_ms, stream.len());

        let acknowledged = header.last_received_predicted_step_id;
        let discarded = self.predicted.discard_up_to(acknowledged.wrapping_add(1));
        log::trace!(
            target: self.log.as_str(),
            "server has predicted step {:08X}, discarded {}",
            acknowledged,
            discarded
        );

        let mut stored = 0;
        for (id, payload) in read_step_run(stream)? {
            match self.pending.receive(id, payload) {
                PendingReceive::Stored => stored += 1,
                PendingReceive::Duplicate => {
                    log::trace!(target: self.log.as_str(), "authoritative step {:08X} again", id);
                }
                PendingReceive::OutOfWindow => {
                    log::debug!(
                        target: self.log.as_str(),
                        "authoritative step {:08X} is outside the receive window at {:08X}",
                        id,
                        self.pending.expected_id()
                    );
                }
            }
        }

        let copied = self.pending.copy_completed_into(&mut self.authoritative)?;
        self.metrics
            .waiting_authoritative_steps
            .add(self.authoritative.len() as i32);

        if stored > 0 {
            self.quality.received_authoritative_steps(stored);
            self.metrics.authoritative_steps_in.add(stored as u64);
        }

        log::trace!(
            target: self.log.as_str(),
            "authoritative steps stored {}, completed {}, waiting {}",
            stored,
            copied,
            self.authoritative.len()
        );

        Ok(())
    }
}
