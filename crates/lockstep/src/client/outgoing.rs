use crate::error::ClientError;
use crate::net::{
    Command, ConnectFlags, ConnectRequest, DatagramTransport, DownloadGameStateRequest,
    MAX_DATAGRAM_SIZE, OUT_OF_BAND_CONNECTION_ID, OutStream, PROTOCOL_VERSION, integrity_tag,
};

use super::session::ClientSession;
use super::state::{JoinPhase, SessionState};
use super::step_exchange::StepExchange;

const HANDSHAKE_WAIT_TICKS: u32 = 4;

/// A datagram being composed: the header is written, the tag slot is reserved when connected.
struct DatagramOut {
    stream: OutStream,
    tag_at: Option<usize>,
    header_len: usize,
}

impl<T: DatagramTransport> ClientSession<T> {
    pub(super) fn send_outgoing(&mut self) -> Result<(), ClientError> {
        match self.state {
            SessionState::Idle | SessionState::Connected | SessionState::Disconnected => Ok(()),
            SessionState::Synced => self.send_steps(),
            SessionState::RequestingConnect
            | SessionState::JoiningRequestingState
            | SessionState::JoiningDownloadingState => self.send_control(),
        }
    }

    fn begin_datagram(&self) -> Result<DatagramOut, ClientError> {
        let mut stream = OutStream::with_capacity(MAX_DATAGRAM_SIZE);
        let connection_id = self.connection_id.unwrap_or(OUT_OF_BAND_CONNECTION_ID);

        stream.write_u8(connection_id)?;
        let tag_at = if connection_id != OUT_OF_BAND_CONNECTION_ID {
            Some(stream.reserve_u32()?)
        } else {
            None
        };
        self.ordered_out.prepare(&mut stream)?;
        stream.write_u16((self.now_ms & 0xFFFF) as u16)?;

        let header_len = stream.pos();
        Ok(DatagramOut {
            stream,
            tag_at,
            header_len,
        })
    }

    /// Sends the datagram unless nothing was written after the header. Returns whether it was sent.
    fn finish_datagram(&mut self, mut datagram: DatagramOut) -> Result<bool, ClientError> {
        if datagram.stream.pos() <= datagram.header_len {
            return Ok(false);
        }

        if let Some(at) = datagram.tag_at {
            let tag = integrity_tag(self.connection_secret, &datagram.stream.octets()[at + 4..]);
            datagram.stream.patch_u32(at, tag)?;
        }

        let octets = datagram.stream.octets();
        if let Err(err) = self.transport.send(octets) {
            log::error!(target: self.log.as_str(), "send failed: {}", err);
            return Err(err.into());
        }

        self.ordered_out.commit();
        self.stats.datagrams_sent += 1;
        self.stats.octets_sent += octets.len() as u64;
        self.metrics.datagrams_out.add(1);

        Ok(true)
    }

    fn send_steps(&mut self) -> Result<(), ClientError> {
        let mut datagram = self.begin_datagram()?;

        Command::GameStep.write(&mut datagram.stream)?;
        StepExchange::write_ack(&self.pending, &mut datagram.stream)?;
        let count = self
            .exchange
            .write_steps(&self.predicted, &mut datagram.stream)?;

        log::trace!(
            target: self.log.as_str(),
            "sending {} predicted steps from {:08X}, waiting for authoritative {:08X}",
            count,
            self.exchange.cursor(),
            self.pending.expected_id()
        );

        if self.finish_datagram(datagram)? {
            self.exchange.commit_sent();
        }

        self.metrics
            .outgoing_queue
            .add(StepExchange::queue_depth(&self.predicted) as i32);
        self.wait_ticks = 0;

        Ok(())
    }

    fn send_control(&mut self) -> Result<(), ClientError> {
        let mut datagram = self.begin_datagram()?;
        self.write_control_message(&mut datagram.stream)?;
        self.finish_datagram(datagram)?;
        Ok(())
    }

    fn write_control_message(&mut self, stream: &mut OutStream) -> Result<(), ClientError> {
        match self.state {
            SessionState::RequestingConnect => {
                let mut flags = ConnectFlags::empty();
                flags.set(ConnectFlags::USE_DEBUG_STREAMS, self.config.wants_debug_streams);
                let request = ConnectRequest {
                    protocol_version: PROTOCOL_VERSION,
                    application_version: self.config.application_version,
                    flags,
                };
                log::debug!(
                    target: self.log.as_str(),
                    "connect request for application {} (protocol {})",
                    request.application_version,
                    request.protocol_version
                );
                request.write(stream)?;
                self.wait_ticks = HANDSHAKE_WAIT_TICKS;
            }
            SessionState::JoiningRequestingState => match self.join_phase {
                JoinPhase::JoiningParticipant => {
                    if self.write_join_request(stream)? {
                        self.wait_ticks = HANDSHAKE_WAIT_TICKS;
                    }
                }
                JoinPhase::JoinedParticipant => {
                    log::trace!(
                        target: self.log.as_str(),
                        "requesting game state ({})",
                        self.client_request_id
                    );
                    DownloadGameStateRequest {
                        client_request_id: self.client_request_id,
                    }
                    .write(stream)?;
                    self.wait_ticks = HANDSHAKE_WAIT_TICKS;
                }
                JoinPhase::OutOfParticipantSlots => {}
            },
            SessionState::JoiningDownloadingState => {
                if let Some(download) = &self.download {
                    Command::DownloadGameStateStatus.write(stream)?;
                    stream.write_u16(download.channel)?;
                    download.blob.write_ack(stream)?;
                }
                self.wait_ticks = 0;
            }
            SessionState::Idle
            | SessionState::Connected
            | SessionState::Synced
            | SessionState::Disconnected => {}
        }

        Ok(())
    }

    fn write_join_request(&self, stream: &mut OutStream) -> Result<bool, ClientError> {
        let Some(request) = &self.join_request else {
            log::debug!(target: self.log.as_str(), "no join request assigned yet");
            return Ok(false);
        };
        request.write(stream)?;
        Ok(true)
    }
}
