// Transport capability consumed by every pairing phase.

use bytes::Bytes;

/// Physical transport the Security Manager channel runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkType {
    /// LE-U logical link (fixed channel 0x0006).
    #[default]
    Le,
    /// ACL-U logical link (fixed channel 0x0007, cross-transport pairing).
    BrEdr,
}

/// The Security Manager fixed channel.
///
/// A phase keeps only a `Weak` reference to its channel; inbound frames and
/// channel closure are delivered to the phase by its owner (see
/// [`crate::host::PhaseHost`]).
pub trait Channel {
    /// Queue one complete SMP PDU for transmission.
    fn send(&self, pdu: Bytes);

    fn link_type(&self) -> LinkType {
        LinkType::Le
    }
}
