//! The six control-plane commands (§6), each a thin wrapper around
//! `nfqlb-common` state transitions and the `region` module's persistence.

use anyhow::{Context, Result};
use nfqlb_common::maglev::{fresh_rng, seeded_rng};
use nfqlb_common::{LookupMode, SharedData};
use tracing::info;

use crate::queue::{FramedQueue, PacketQueue};
use crate::region::{self, RegionReader, RegionWriter};

pub fn cmd_create(name: &str, own_fwmark: i32, fw_offset: i32, seed: Option<u64>, m: Option<u32>, n: Option<u32>) -> Result<()> {
    let mut rng = match seed {
        Some(s) => seeded_rng(s),
        None => fresh_rng(),
    };
    let sh = SharedData::create(own_fwmark, fw_offset, m, n, &mut rng);
    region::create(name, &sh).with_context(|| format!("creating shared region {name}"))?;
    info!(
        region = name,
        m = sh.magd.m,
        n = sh.magd.n,
        own_fwmark,
        fw_offset,
        "created shared region"
    );
    Ok(())
}

pub fn cmd_show(name: &str) -> Result<String> {
    let sh = region::read(name).with_context(|| format!("reading shared region {name}"))?;
    info!(region = name, "read shared region");
    Ok(format_shared(&sh))
}

fn format_shared(sh: &SharedData) -> String {
    let mut out = String::new();
    out.push_str(&format!("ownFwmark {}\n", sh.own_fwmark));
    out.push_str(&format!("fwOffset {}\n", sh.fw_offset));
    out.push_str(&format!("M {}\n", sh.magd.m));
    out.push_str(&format!("N {}\n", sh.magd.n));
    out.push_str(&format!(
        "active {}\n",
        sh.magd
            .active
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a != 0)
            .map(|(i, _)| (i as i32 + sh.fw_offset).to_string())
            .collect::<Vec<_>>()
            .join(",")
    ));
    out.push_str(&format!("nActive {}\n", sh.modulo.n_active));
    out
}

pub fn cmd_clean(name: &str) -> Result<()> {
    region::destroy(name).with_context(|| format!("removing shared region {name}"))?;
    info!(region = name, "removed shared region");
    Ok(())
}

pub fn cmd_activate(name: &str, ids: &[i64]) -> Result<()> {
    let mut writer = RegionWriter::open(name).with_context(|| format!("opening shared region {name}"))?;
    let mut sh = writer.load()?;
    sh.activate(ids.iter().copied());
    writer.store(&sh)?;
    info!(region = name, ?ids, "activated backends");
    Ok(())
}

pub fn cmd_deactivate(name: &str, ids: &[i64]) -> Result<()> {
    let mut writer = RegionWriter::open(name).with_context(|| format!("opening shared region {name}"))?;
    let mut sh = writer.load()?;
    sh.deactivate(ids.iter().copied());
    writer.store(&sh)?;
    info!(region = name, ?ids, "deactivated backends");
    Ok(())
}

/// Runs the data-plane loop: map the region once for the lifetime of the
/// loop (§3: "the data-plane process holds a read-only handle for its
/// lifetime"), re-decoding that one live mapping per packet so an
/// `activate`/`deactivate` racing the loop is still picked up by the very
/// next packet — without a fresh `open`/`mmap` syscall pair each time.
pub fn cmd_run<Q: PacketQueue>(name: &str, mode: LookupMode, port_extension: bool, mut queue: Q) -> Result<()> {
    info!(region = name, ?mode, port_extension, "starting data-plane loop");
    let reader = RegionReader::open(name).with_context(|| format!("mapping shared region {name}"))?;
    loop {
        let sh = reader.load().with_context(|| format!("reading shared region {name}"))?;
        let Some(pkt) = queue.recv().context("receiving packet from queue")? else {
            info!("queue closed, stopping data-plane loop");
            return Ok(());
        };

        let mark = nfqlb_common::classify(&sh, pkt.protocol, &pkt.payload, port_extension, mode);
        if mark == 0 {
            tracing::debug!(packet_id = pkt.packet_id, "packet not classified, leaving unmarked");
        } else {
            tracing::debug!(packet_id = pkt.packet_id, mark, "classified packet");
        }
        queue
            .send_verdict(pkt.packet_id, mark)
            .context("sending verdict to queue")?;
    }
}

/// Convenience constructor used by `main` to build the default
/// [`FramedQueue`] transport over a duplex stream.
pub fn framed_queue<S: std::io::Read + std::io::Write>(stream: S) -> FramedQueue<S> {
    FramedQueue::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::with_isolated_runtime_dir;
    use nfqlb_common::L2Protocol;
    use std::io::Cursor;

    #[test]
    fn create_show_activate_deactivate_clean_round_trip() {
        with_isolated_runtime_dir(|| {
            cmd_create("rt", 0, 1, Some(9), Some(23), Some(5)).unwrap();
            let shown = cmd_show("rt").unwrap();
            assert!(shown.contains("M 23"));
            assert!(shown.contains("nActive 4"));

            cmd_deactivate("rt", &[1, 2, 3, 4]).unwrap();
            let shown = cmd_show("rt").unwrap();
            assert!(shown.contains("nActive 0"));

            cmd_activate("rt", &[2, 3]).unwrap();
            let shown = cmd_show("rt").unwrap();
            assert!(shown.contains("nActive 2"));

            cmd_clean("rt").unwrap();
            assert!(cmd_show("rt").is_err());
        });
    }

    #[derive(Default)]
    struct InMemoryStream {
        inbound: Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl std::io::Read for InMemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inbound.read(buf)
        }
    }

    impl std::io::Write for InMemoryStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbound.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn encode_frame(packet_id: u32, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = packet_id.to_le_bytes().to_vec();
        buf.extend_from_slice(&ethertype.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn run_loop_classifies_one_packet_then_stops_on_eof() {
        with_isolated_runtime_dir(|| {
            cmd_create("run-test", 0, 1, Some(1), Some(23), Some(5)).unwrap();

            let mut pkt = vec![0u8; 20];
            pkt[0] = 0x45;
            pkt[9] = 6; // TCP
            pkt[12..16].copy_from_slice(&[10, 0, 0, 1]);
            pkt[16..20].copy_from_slice(&[10, 0, 0, 2]);
            let frame = encode_frame(1, 0x0800, &pkt);

            let stream = InMemoryStream {
                inbound: Cursor::new(frame),
                outbound: Vec::new(),
            };
            let queue = framed_queue(stream);
            cmd_run("run-test", LookupMode::Maglev, false, queue).unwrap();

            cmd_clean("run-test").unwrap();
        });
    }

    #[test]
    fn format_shared_lists_active_ids_in_mark_space() {
        let mut rng = seeded_rng(1);
        let sh = SharedData::create(0, 100, Some(23), Some(5), &mut rng);
        let text = format_shared(&sh);
        assert!(text.contains("active 100,101,102,103"));
        let _ = L2Protocol::Ipv4; // keep import used if reordered
    }
}
