//! Protocol tags carried in the packet header `tp` byte.

/// Tags on packets exchanged with clients.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProto {
    /// Insert succeeded; body carries `success_msg`.
    ResInsert = 0x81,
    /// Insert failed; body carries `error_msg`.
    ErrInsert = 0xC1,
}

impl From<u8> for ClientProto {
    fn from(value: u8) -> Self {
        match value {
            0x81 => Self::ResInsert,
            _ => Self::ErrInsert,
        }
    }
}

/// Tags on packets exchanged between servers.
///
/// `*Pool` packets are addressed to whichever server of a pool answers;
/// `*Server` packets are addressed to a specific server (the replica path).
/// The `Test*` variants instruct the receiver to run the test variant of
/// the local apply; `Tested*` marks a body that was already re-routed and
/// must not be tested again.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerProto {
    InsertPool = 0x10,
    InsertTestPool = 0x11,
    InsertServer = 0x12,
    InsertTestServer = 0x13,
    InsertTestedServer = 0x14,
    AckInsert = 0x90,
    Unknown = 0xFF,
}

impl From<u8> for PeerProto {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::InsertPool,
            0x11 => Self::InsertTestPool,
            0x12 => Self::InsertServer,
            0x13 => Self::InsertTestServer,
            0x14 => Self::InsertTestedServer,
            0x90 => Self::AckInsert,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_proto_roundtrip() {
        for tp in [
            PeerProto::InsertPool,
            PeerProto::InsertTestPool,
            PeerProto::InsertServer,
            PeerProto::InsertTestServer,
            PeerProto::InsertTestedServer,
            PeerProto::AckInsert,
        ] {
            assert_eq!(PeerProto::from(tp as u8), tp);
        }
        assert_eq!(PeerProto::from(0x55), PeerProto::Unknown);
    }

    #[test]
    fn test_client_proto_roundtrip() {
        assert_eq!(ClientProto::from(ClientProto::ResInsert as u8), ClientProto::ResInsert);
        assert_eq!(ClientProto::from(ClientProto::ErrInsert as u8), ClientProto::ErrInsert);
    }
}
