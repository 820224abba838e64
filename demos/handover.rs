#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use burble_bass::att::Handle;
use burble_bass::bass::*;
use burble_bass::gatt::{ConnId, Transport, WriteReq};
use burble_bass::le::{Addr, RawAddr};

#[derive(Clone, Copy, Debug, clap::Parser)]
struct Args {
    /// Number of Broadcast Receive State characteristics.
    #[arg(short = 'n', long, default_value_t = 2)]
    receive_states: u8,

    /// Size of the buffer used for each marshal call.
    #[arg(short, long, default_value_t = 32)]
    buf_size: usize,

    /// Do not mirror the source table on the secondary radio.
    #[arg(short, long)]
    diverge: bool,
}

/// Transport that logs notifications.
#[derive(Debug)]
struct Radio(&'static str);

impl Transport for Radio {
    fn notify(&mut self, cid: ConnId, hdl: Handle, val: &[u8]) {
        let st = ReceiveState::decode(val).map(|(id, st)| (id, st.broadcast_id));
        info!("[{}] Notify {cid} {hdl}: {val:02X?} => {st:?}", self.0);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if args.receive_states == 0 || args.buf_size == 0 {
        bail!("receive states and buffer size must be non-zero");
    }
    let cfg = Config::new(args.receive_states).with_max_clients(2);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut pri = Server::new(cfg, Radio("primary"), tx.clone());
    let mut sec = Server::new(cfg, Radio("secondary"), tx);

    let (c1, c2) = (conn(1)?, conn(2)?);
    pri.add_client(c1, None)?;
    pri.add_client(c2, Some(ClientConfig::new(cfg.receive_states.into(), Ccc::NOTIFY)))?;
    let cccd = pri.layout().cccd(0);
    pri.write(&WriteReq::new(c1, cccd, &[0x01, 0x00]))?;

    // Client asks the primary to add a source
    let op = [
        0x02, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x01, 0x33, 0x22, 0x11, 0x01, 0x40,
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x02, 0x01, 0x08,
    ];
    let cp = pri.layout().control_point();
    pri.write(&WriteReq::new(c1, cp, &op))?;
    while let Ok(ind) = rx.try_recv() {
        info!("Indication: {ind:?}");
        if let Indication::AddSource { req, .. } = ind {
            let st = req.receive_state().with_pa_sync_state(PaSyncState::Synchronized);
            let id = pri.add_or_update_source(0, st.clone())?;
            if !args.diverge {
                sec.add_or_update_source(0, st)?;
            }
            info!("Source {id} added");
        }
    }

    // Hand both connections over to the secondary
    if handover_veto(Some(&pri)) {
        bail!("handover refused");
    }
    let mut buf = vec![0; args.buf_size];
    for cid in [c1, c2] {
        let mut calls = 0;
        loop {
            let m = pri.handover_marshal(cid, &mut buf)?;
            let u = sec.handover_unmarshal(cid, &buf[..m.len])?;
            calls += 1;
            if u.done != m.done {
                pri.handover_abort();
                sec.handover_abort();
                bail!("unmarshal out of step for {cid}");
            }
            if m.done {
                break;
            }
        }
        info!("Transferred {cid} in {calls} call(s)");
        pri.handover_commit(cid, false)?;
        sec.handover_commit(cid, true)?;
    }
    pri.handover_complete();
    sec.handover_complete();

    for cid in [c1, c2] {
        println!("{cid}: {:?}", sec.client_config(cid));
    }
    println!("Secondary sources: {:?}", sec.source_ids());
    Ok(())
}

fn conn(v: u32) -> Result<ConnId> {
    ConnId::new(v).ok_or_else(|| anyhow::anyhow!("invalid connection ID {v}"))
}
