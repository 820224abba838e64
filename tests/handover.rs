//! Handover of two connections between mirrored radios.

use burble_bass::att::Handle;
use burble_bass::bass::*;
use burble_bass::gatt::{ConnId, NotifyVal, WriteReq};
use burble_bass::le::{Addr, RawAddr};
use matches::assert_matches;
use tokio::sync::mpsc::{self, UnboundedReceiver};

type Srv = Server<Vec<NotifyVal>>;

struct Radios {
    a: Srv,
    b: Srv,
    _rx: [UnboundedReceiver<Indication>; 2],
}

const N: u8 = 3;

fn radio() -> (Srv, UnboundedReceiver<Indication>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cfg = Config::new(N)
        .with_start_handle(Handle::new(0x0040).unwrap())
        .with_max_clients(2);
    (Server::new(cfg, Vec::new(), tx), rx)
}

fn source() -> ReceiveState {
    let addr = Addr::Random(RawAddr::from([0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xC6]));
    ReceiveState::new(addr, 4, 0x00_BEEF)
        .with_pa_sync_state(PaSyncState::Synchronized)
        .with_encryption(BigEncryption::BroadcastCodeRequired, [0; 16])
        .with_subgroup(Subgroup::new(0b0110, [0x03, 0x02, 0x04, 0x00]))
}

fn conn(v: u32) -> ConnId {
    ConnId::new(v).unwrap()
}

impl Radios {
    /// Creates two radios with two connections on radio A. `mirror` controls
    /// whether radio B has the same table.
    fn new(mirror: bool) -> Self {
        let ((mut a, ra), (mut b, rb)) = (radio(), radio());
        assert_eq!(a.add_or_update_source(0, source()), Ok(1));
        if mirror {
            assert_eq!(b.add_or_update_source(0, source()), Ok(1));
        }
        a.set_broadcast_code(1, [0x11; 16]).unwrap();

        a.add_client(conn(1), None).unwrap();
        a.add_client(conn(2), None).unwrap();
        for i in 0..usize::from(N) {
            let hdl = a.layout().cccd(i);
            a.write(&WriteReq::new(conn(1), hdl, &[0x01, 0x00])).unwrap();
        }
        let hdl = a.layout().cccd(0);
        a.write(&WriteReq::new(conn(2), hdl, &[0x01, 0x00])).unwrap();
        a.transport_mut().clear();
        Self { a, b, _rx: [ra, rb] }
    }

    /// Runs one step of the handover for `cid` using a `chunk`-byte buffer.
    fn step(&mut self, cid: ConnId, chunk: usize) {
        self.transfer(cid, chunk);
        self.commit(cid);
    }

    /// Transfers the handover object of `cid` without committing it.
    fn transfer(&mut self, cid: ConnId, chunk: usize) {
        let mut buf = vec![0; chunk];
        loop {
            let m = self.a.handover_marshal(cid, &mut buf).unwrap();
            let mut v = &buf[..m.len];
            while !v.is_empty() {
                let u = self.b.handover_unmarshal(cid, v).unwrap();
                v = &v[u.len..];
                if u.done {
                    assert!(v.is_empty());
                }
            }
            if m.done {
                break;
            }
        }
    }

    fn commit(&mut self, cid: ConnId) {
        self.a.handover_commit(cid, false).unwrap();
        self.b.handover_commit(cid, true).unwrap();
    }

    fn finish(&mut self) {
        self.a.handover_complete();
        self.b.handover_complete();
    }
}

#[test]
fn scenario_c() {
    let mut r = Radios::new(true);
    assert!(!handover_veto(Some(&r.a)));
    r.step(conn(1), 16);
    assert_eq!(r.b.handover_step(), Some(1));
    r.step(conn(2), 16);
    assert_eq!(r.b.handover_step(), Some(2));
    r.finish();

    for c in [conn(1), conn(2)] {
        assert!(r.b.client_config(c).is_some());
        assert_eq!(r.b.client_config(c), r.a.client_config(c));
    }
    assert_eq!(r.b.source_ids(), r.a.source_ids());
    assert_eq!(r.b.receive_state(1), r.a.receive_state(1));
    assert_eq!(r.b.broadcast_code(1), Ok([0x11; 16]));

    // Identical tables produce no notifications
    assert!(r.b.transport().is_empty());
    assert!(r.a.transport().is_empty());
    assert_eq!(r.b.handover_step(), None);
}

#[test]
fn diverged_tables() {
    let mut r = Radios::new(false);
    r.step(conn(1), 5);
    let n = std::mem::take(r.b.transport_mut());
    assert_eq!(n.len(), 1);
    assert_eq!((n[0].cid, n[0].hdl), (conn(1), r.b.layout().receive_state(0)));
    assert!(n[0].val.is_empty());

    // Second connection receives the same slot
    r.step(conn(2), 5);
    let n = std::mem::take(r.b.transport_mut());
    assert_eq!(n.len(), 1);
    assert_eq!((n[0].cid, n[0].hdl), (conn(2), r.b.layout().receive_state(0)));
    assert!(n[0].val.is_empty());
    r.finish();

    // Local table remains unchanged
    assert_eq!(r.b.source_ids(), [0; N as usize]);
}

#[test]
fn reverse_commit_order() {
    let mut r = Radios::new(false);
    r.transfer(conn(1), 16);
    r.transfer(conn(2), 16);
    r.commit(conn(2));
    r.commit(conn(1));
    r.finish();

    // Both connections converge on the local value of the differing slot
    let hdl = r.b.layout().receive_state(0);
    let n: Vec<_> = (r.b.transport().iter())
        .map(|n| (n.cid, n.hdl, n.val.len()))
        .collect();
    assert_eq!(n, [(conn(2), hdl, 0), (conn(1), hdl, 0)]);
}

#[test]
fn already_connected() {
    let mut r = Radios::new(false);
    r.b.add_client(conn(1), None).unwrap();
    r.step(conn(1), 64);
    assert!(r.b.transport().is_empty());
    assert_eq!(
        r.b.client_config(conn(1)),
        Some(ClientConfig::new(usize::from(N), Ccc::UNWRITTEN))
    );

    // The pending slot is still replayed to the next connection
    r.step(conn(2), 64);
    assert_eq!(r.b.transport().len(), 1);
    r.finish();
}

#[test]
fn abort() {
    let mut r = Radios::new(true);
    let mut buf = [0; 8];
    let m = r.a.handover_marshal(conn(1), &mut buf).unwrap();
    r.b.handover_unmarshal(conn(1), &buf[..m.len]).unwrap();
    assert_matches!(
        r.b.handover_commit(conn(1), true),
        Err(HandoverError::Truncated { .. })
    );
    r.a.handover_abort();
    r.b.handover_abort();
    assert!(r.b.client_config(conn(1)).is_none());

    // A new attempt starts from step 0
    r.step(conn(1), 8);
    assert_eq!(r.b.handover_step(), Some(1));
    r.finish();
    assert!(r.b.client_config(conn(1)).is_some());
}
