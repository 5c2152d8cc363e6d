// Shared fakes and builders for the StrandPair integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;

use strandpair::codec::{io_cap_from_pdu, Code, Command, PairingRequestParams};
use strandpair::crypto::{toolbox, EcdhKey, LocalEcdhKey, RandomSource};
use strandpair::{
    AddressKind, Channel, ConfirmToken, DeviceAddress, DisplayMethod, IdentityInfo, IoCapability,
    KeyDistGen, LinkType, Listener, PairingError, PairingFeatures, PairingMethod, PairingPhase,
    PasskeyToken, Phase2Params, SecureConnectionsPhase2, UInt128,
};

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn seeded(seed: u64) -> RandomSource {
    RandomSource::from_rng(StdRng::seed_from_u64(seed))
}

// ── Channel ──────────────────────────────────────────────────────────────

pub struct FakeChannel {
    sent: RefCell<Vec<Bytes>>,
    link_type: Cell<LinkType>,
}

impl FakeChannel {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            sent: RefCell::new(Vec::new()),
            link_type: Cell::new(LinkType::Le),
        })
    }

    pub fn set_link_type(&self, link_type: LinkType) {
        self.link_type.set(link_type);
    }

    /// Drain and decode everything sent so far.
    pub fn take_sent(&self) -> Vec<Command> {
        self.take_raw()
            .iter()
            .map(|pdu| Command::decode(pdu).unwrap())
            .collect()
    }

    pub fn take_raw(&self) -> Vec<Bytes> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl Channel for FakeChannel {
    fn send(&self, pdu: Bytes) {
        self.sent.borrow_mut().push(pdu);
    }

    fn link_type(&self) -> LinkType {
        self.link_type.get()
    }
}

pub fn weak_channel(channel: &Rc<FakeChannel>) -> Weak<dyn Channel> {
    let weak: Weak<FakeChannel> = Rc::downgrade(channel);
    weak
}

// ── Listener ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRequest {
    Confirm(ConfirmToken),
    Display {
        passkey: u32,
        method: DisplayMethod,
        token: ConfirmToken,
    },
    Passkey(PasskeyToken),
}

#[derive(Default)]
pub struct FakeListener {
    requests: RefCell<Vec<UserRequest>>,
    failures: RefCell<Vec<PairingError>>,
}

impl FakeListener {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn take_requests(&self) -> Vec<UserRequest> {
        self.requests.borrow_mut().drain(..).collect()
    }

    /// The single outstanding request, drained.
    pub fn take_request(&self) -> UserRequest {
        let mut requests = self.take_requests();
        assert_eq!(requests.len(), 1, "expected exactly one user request");
        requests.remove(0)
    }

    pub fn failures(&self) -> Vec<PairingError> {
        self.failures.borrow().clone()
    }
}

impl Listener for FakeListener {
    fn on_identity_request(&self) -> Option<IdentityInfo> {
        None
    }

    fn confirm_pairing(&self, token: ConfirmToken) {
        self.requests.borrow_mut().push(UserRequest::Confirm(token));
    }

    fn display_passkey(&self, passkey: u32, method: DisplayMethod, token: ConfirmToken) {
        self.requests.borrow_mut().push(UserRequest::Display {
            passkey,
            method,
            token,
        });
    }

    fn request_passkey(&self, token: PasskeyToken) {
        self.requests.borrow_mut().push(UserRequest::Passkey(token));
    }

    fn on_pairing_failed(&self, error: PairingError) {
        self.failures.borrow_mut().push(error);
    }
}

pub fn weak_listener(listener: &Rc<FakeListener>) -> Weak<dyn Listener> {
    let weak: Weak<FakeListener> = Rc::downgrade(listener);
    weak
}

// ── Parameters ───────────────────────────────────────────────────────────

pub fn initiator_address() -> DeviceAddress {
    DeviceAddress::new(AddressKind::Random, [0xA6, 0xA5, 0xA4, 0xA3, 0xA2, 0xC1])
}

pub fn responder_address() -> DeviceAddress {
    DeviceAddress::new(AddressKind::Public, [0xB6, 0xB5, 0xB4, 0xB3, 0xB2, 0xB1])
}

pub fn params(initiator: bool, secure_connections: bool, method: PairingMethod) -> Phase2Params {
    let auth_req = if secure_connections { 0x0D } else { 0x05 };
    let preq = PairingRequestParams {
        io_capability: IoCapability::KeyboardDisplay,
        oob_data_present: false,
        auth_req,
        max_encryption_key_size: 16,
        initiator_key_distribution: KeyDistGen::ID_KEY,
        responder_key_distribution: KeyDistGen::ENC_KEY,
    };
    let pres = PairingRequestParams {
        io_capability: IoCapability::DisplayYesNo,
        ..preq
    };
    Phase2Params {
        features: PairingFeatures {
            initiator,
            secure_connections,
            will_bond: true,
            method,
            encryption_key_size: 16,
            local_key_distribution: KeyDistGen::NONE,
            remote_key_distribution: KeyDistGen::ENC_KEY,
        },
        preq: preq.to_pdu(Code::PairingRequest),
        pres: pres.to_pdu(Code::PairingResponse),
        initiator_address: initiator_address(),
        responder_address: responder_address(),
    }
}

// ── Completion ───────────────────────────────────────────────────────────

/// A completion callback plus a handle to observe what it received.
pub fn key_sink() -> (Rc<Cell<Option<UInt128>>>, Rc<Cell<u32>>, impl FnOnce(UInt128) + 'static) {
    let key = Rc::new(Cell::new(None));
    let calls = Rc::new(Cell::new(0));
    let (key_out, calls_out) = (key.clone(), calls.clone());
    let callback = move |value: UInt128| {
        key_out.set(Some(value));
        calls_out.set(calls_out.get() + 1);
    };
    (key, calls, callback)
}

// ── Secure Connections ───────────────────────────────────────────────────

pub fn frame(command: Command) -> Vec<u8> {
    command.encode().to_vec()
}

pub fn key_frame(key: &EcdhKey) -> Vec<u8> {
    frame(Command::PairingPublicKey(key.serialized_public_key()))
}

pub fn sc_side(params: Phase2Params, seed: u64) -> (Side<SecureConnectionsPhase2>, Rc<Cell<u32>>) {
    init_tracing();
    let channel = FakeChannel::new();
    let listener = FakeListener::new();
    let (key, calls, on_ltk_ready) = key_sink();
    let phase = SecureConnectionsPhase2::new(
        weak_channel(&channel),
        weak_listener(&listener),
        params,
        seeded(seed),
        on_ltk_ready,
    );
    (
        Side {
            phase,
            channel,
            listener,
            key,
        },
        calls,
    )
}

/// Stage 2 values computed independently of the phase under test.
pub struct Expected {
    pub ea: UInt128,
    pub eb: UInt128,
    pub ltk: UInt128,
}

/// `dh_key_of` is the scripted peer's key pair and the phase's public key.
pub fn expected_stage2(
    params: &Phase2Params,
    dh_key_of: (&LocalEcdhKey, &EcdhKey),
    na: &UInt128,
    nb: &UInt128,
    r: &UInt128,
) -> Expected {
    let (secret, public) = dh_key_of;
    let dh_key = secret.calculate_dh_key(public).unwrap();
    let ia = &params.initiator_address;
    let ra = &params.responder_address;
    let keys = toolbox::f5(&dh_key, na, nb, ia, ra);
    Expected {
        ea: toolbox::f6(&keys.mac_key, na, nb, r, &io_cap_from_pdu(&params.preq), ia, ra),
        eb: toolbox::f6(&keys.mac_key, nb, na, r, &io_cap_from_pdu(&params.pres), ra, ia),
        ltk: *keys.ltk,
    }
}

// ── Loopback ─────────────────────────────────────────────────────────────

/// One side of a two-phase run.
pub struct Side<P: PairingPhase> {
    pub phase: P,
    pub channel: Rc<FakeChannel>,
    pub listener: Rc<FakeListener>,
    pub key: Rc<Cell<Option<UInt128>>>,
}

/// Answer every outstanding request on `side`: accept confirmations and
/// type the passkey displayed on the other side. A passkey request is left
/// pending until that passkey is known.
pub fn answer_requests<P: PairingPhase>(side: &mut Side<P>, passkey: &mut Option<u32>) -> bool {
    let mut answered = false;
    for request in side.listener.take_requests() {
        if side.phase.has_failed() {
            break;
        }
        match (request, *passkey) {
            (UserRequest::Confirm(token), _) => side.phase.on_user_confirm(token, true),
            (UserRequest::Display { passkey: shown, token, .. }, _) => {
                *passkey = Some(shown);
                side.phase.on_user_confirm(token, true);
            }
            (UserRequest::Passkey(token), Some(value)) => {
                side.phase.on_user_passkey(token, i64::from(value));
            }
            (UserRequest::Passkey(token), None) => {
                side.listener.request_passkey(token);
                continue;
            }
        }
        answered = true;
    }
    answered
}

/// Move frames between the two sides. Returns whether anything moved.
pub fn deliver<A: PairingPhase, B: PairingPhase>(a: &mut Side<A>, b: &mut Side<B>) -> bool {
    let mut moved = false;
    for pdu in a.channel.take_raw() {
        moved = true;
        if !b.phase.has_failed() {
            b.phase.on_rx_frame(&pdu);
        }
    }
    for pdu in b.channel.take_raw() {
        moved = true;
        if !a.phase.has_failed() {
            a.phase.on_rx_frame(&pdu);
        }
    }
    moved
}

/// Run both sides to quiescence, answering user requests as they appear.
pub fn run_loopback<A: PairingPhase, B: PairingPhase>(a: &mut Side<A>, b: &mut Side<B>) {
    let mut passkey = None;
    loop {
        let mut progressed = deliver(a, b);
        progressed |= answer_requests(a, &mut passkey);
        progressed |= answer_requests(b, &mut passkey);
        if !progressed {
            break;
        }
    }
}
