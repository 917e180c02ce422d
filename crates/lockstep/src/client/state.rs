use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    RequestingConnect,
    Connected,
    JoiningRequestingState,
    JoiningDownloadingState,
    Synced,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RequestingConnect => "requesting connect",
            Self::Connected => "connected",
            Self::JoiningRequestingState => "requesting game state",
            Self::JoiningDownloadingState => "downloading game state",
            Self::Synced => "synced",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinPhase {
    JoiningParticipant,
    JoinedParticipant,
    OutOfParticipantSlots,
}

impl fmt::Display for JoinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::JoiningParticipant => "joining participant",
            Self::JoinedParticipant => "joined participant",
            Self::OutOfParticipantSlots => "out of participant slots",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisconnectReason {
    #[default]
    KeepConnection,
    NotReceivingStepsFromServer,
    NotReceivingDatagramsFromServer,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeepConnection => "keep connection",
            Self::NotReceivingStepsFromServer => "not receiving steps from server",
            Self::NotReceivingDatagramsFromServer => "not receiving datagrams from server",
        };
        f.write_str(name)
    }
}
