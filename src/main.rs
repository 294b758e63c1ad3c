use anyhow::{Context, Result};
use clap::Parser;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Recover the OSPF MD5 authentication key from a .pcap capture — rebuilds the unsigned packet and tests wordlist candidates under both raw and padded-16 key conventions.")]
struct Args {
    /// Input .pcap file containing at least one MD5-signed OSPF packet
    capture: PathBuf,

    /// Wordlist file, one candidate key per line
    wordlist: PathBuf,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Protocol constants ───────────────────────────────────────────────────────

/// IP protocol number for OSPF.
const OSPF_PROTO: u8 = 89;

/// Fixed OSPF packet header length.
const OSPF_HEADER_LEN: usize = 24;

/// Length of the MD5 digest trailer appended to an authenticated packet.
const DIGEST_LEN: usize = 16;

/// Offset of the 2-byte OSPF checksum field, zero when MD5 auth is in use.
const CHECKSUM_OFFSET: usize = 12;

// ─── Crack target ─────────────────────────────────────────────────────────────

/// The two values derived once from the first qualifying OSPF packet: the
/// payload with its digest trailer and checksum field zeroed (the exact bytes
/// the signer hashed before appending the key), and the digest it appended.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CrackTarget {
    canonical: Vec<u8>,
    digest: [u8; DIGEST_LEN],
}

impl CrackTarget {
    /// `payload` must be at least `OSPF_HEADER_LEN + DIGEST_LEN` bytes.
    fn from_payload(payload: &[u8]) -> Self {
        let tail = payload.len() - DIGEST_LEN;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&payload[tail..]);

        let mut canonical = payload.to_vec();
        canonical[tail..].fill(0);
        canonical[CHECKSUM_OFFSET] = 0;
        canonical[CHECKSUM_OFFSET + 1] = 0;

        Self { canonical, digest }
    }
}

// ─── Frame decoding ───────────────────────────────────────────────────────────

/// Returns the OSPF payload of an Ethernet frame, or `None` if the frame does
/// not carry IPv4 protocol 89. Handles a single 802.1Q tag. The payload is
/// bounded by the IPv4 total length when it is sane, so Ethernet trailing
/// padding never leaks into the hash input.
fn ospf_payload(raw: &[u8]) -> Option<&[u8]> {
    if raw.len() < 14 {
        return None;
    }
    let ethertype = u16::from_be_bytes([raw[12], raw[13]]);
    let ip_off = match ethertype {
        0x0800 => 14,
        0x8100 if raw.len() >= 18 && u16::from_be_bytes([raw[16], raw[17]]) == 0x0800 => 18,
        _ => return None,
    };
    if raw.len() < ip_off + 20 || raw[ip_off] >> 4 != 4 {
        return None;
    }
    let ihl = ((raw[ip_off] & 0x0f) as usize) * 4;
    if ihl < 20 || raw.len() < ip_off + ihl {
        return None;
    }
    if raw[ip_off + 9] != OSPF_PROTO {
        return None;
    }
    let total_len = u16::from_be_bytes([raw[ip_off + 2], raw[ip_off + 3]]) as usize;
    let end = if total_len >= ihl && ip_off + total_len <= raw.len() {
        ip_off + total_len
    } else {
        raw.len()
    };
    Some(&raw[ip_off + ihl..end])
}

// ─── Capture scanner ──────────────────────────────────────────────────────────

/// Scans a legacy pcap stream for the first OSPF packet large enough to carry
/// an MD5 digest trailer and derives the crack target from it. Short OSPF
/// payloads are skipped and scanning continues. Returns `None` if the capture
/// holds no qualifying packet.
fn scan_capture<R: Read>(input: R) -> Result<Option<CrackTarget>> {
    let mut reader = LegacyPcapReader::new(65536, input)
        .context("Not a valid legacy pcap file")?;
    let mut frame_num: u64 = 0;
    let mut target: Option<CrackTarget> = None;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(ref hdr) => {
                        if hdr.network.0 != 1 {
                            warn!("linktype {} is not Ethernet – frames may not decode", hdr.network.0);
                        }
                    }
                    PcapBlockOwned::Legacy(ref pkt) => {
                        frame_num += 1;
                        if let Some(payload) = ospf_payload(pkt.data) {
                            if payload.len() >= OSPF_HEADER_LEN + DIGEST_LEN {
                                info!("Frame {}: signed OSPF packet, {} byte payload", frame_num, payload.len());
                                target = Some(CrackTarget::from_payload(payload));
                            } else {
                                debug!("Frame {}: OSPF payload too short ({} bytes), skipping", frame_num, payload.len());
                            }
                        }
                    }
                    PcapBlockOwned::NG(_) => {
                        warn!("pcapng block encountered – only legacy pcap supported");
                    }
                }
                drop(block);
                reader.consume(offset);
                if target.is_some() {
                    break;
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete) => {
                if let Err(e) = reader.refill() {
                    return Err(anyhow::anyhow!("refill error: {:?}", e));
                }
            }
            Err(e) => return Err(anyhow::anyhow!("pcap parse error: {:?}", e)),
        }
    }

    info!("Scanned {} frames", frame_num);
    Ok(target)
}

// ─── Key tester ───────────────────────────────────────────────────────────────

/// Which key-encoding convention produced the matching digest.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyMatch {
    /// Key bytes appended to the canonical buffer as-is.
    Raw(String),
    /// Key bytes zero-padded or truncated to exactly 16 bytes before appending.
    Pad16(String),
}

/// Forces a key to the fixed 16-byte width some OSPF implementations hash:
/// zero-extend short keys, truncate long ones.
fn pad16(key: &[u8]) -> [u8; DIGEST_LEN] {
    let mut padded = [0u8; DIGEST_LEN];
    let n = key.len().min(DIGEST_LEN);
    padded[..n].copy_from_slice(&key[..n]);
    padded
}

/// Tests one candidate key against the target, raw encoding first.
fn try_key(target: &CrackTarget, key: &str) -> Option<KeyMatch> {
    let key_bytes = key.as_bytes();
    let mut input = Vec::with_capacity(target.canonical.len() + key_bytes.len().max(DIGEST_LEN));
    input.extend_from_slice(&target.canonical);

    input.extend_from_slice(key_bytes);
    if md5::compute(&input[..]).0 == target.digest {
        return Some(KeyMatch::Raw(key.to_string()));
    }

    input.truncate(target.canonical.len());
    input.extend_from_slice(&pad16(key_bytes));
    if md5::compute(&input[..]).0 == target.digest {
        return Some(KeyMatch::Pad16(key.to_string()));
    }

    None
}

/// Walks the wordlist lazily, one line at a time, and returns the first key
/// whose recomputed digest equals the captured one. Line terminators are
/// stripped, empty lines are skipped, and undecodable bytes are replaced
/// rather than treated as errors.
fn search_wordlist<R: BufRead>(target: &CrackTarget, mut wordlist: R) -> Result<Option<KeyMatch>> {
    let mut line: Vec<u8> = Vec::new();
    let mut tried: u64 = 0;

    loop {
        line.clear();
        let n = wordlist
            .read_until(b'\n', &mut line)
            .context("Cannot read wordlist line")?;
        if n == 0 {
            break;
        }
        let decoded = String::from_utf8_lossy(&line);
        let key = decoded.trim_end_matches(|c| c == '\r' || c == '\n');
        if key.is_empty() {
            continue;
        }
        tried += 1;
        if tried % 100_000 == 0 {
            info!("{} keys tried", tried);
        }
        if let Some(found) = try_key(target, key) {
            info!("Match after {} keys", tried);
            return Ok(Some(found));
        }
    }

    info!("Wordlist exhausted after {} keys", tried);
    Ok(None)
}

// ─── Main ─────────────────────────────────────────────────────────────────────

fn run(args: &Args) -> Result<ExitCode> {
    info!("Opening {:?}", args.capture);
    let capture = File::open(&args.capture)
        .with_context(|| format!("Cannot open {:?}", args.capture))?;

    let target = match scan_capture(BufReader::new(capture))? {
        Some(t) => t,
        None => {
            println!("No suitable OSPF packet found.");
            return Ok(ExitCode::from(2));
        }
    };
    println!("Captured digest (hex): {}", hex::encode(target.digest));

    info!("Opening {:?}", args.wordlist);
    let wordlist = File::open(&args.wordlist)
        .with_context(|| format!("Cannot open {:?}", args.wordlist))?;

    match search_wordlist(&target, BufReader::new(wordlist))? {
        Some(KeyMatch::Raw(key)) => {
            println!("FOUND_RAW:{}", key);
            Ok(ExitCode::SUCCESS)
        }
        Some(KeyMatch::Pad16(key)) => {
            println!("FOUND_PAD16:{}", key);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("No match found with this wordlist.");
            Ok(ExitCode::from(3))
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            println!("Usage: ospfcrack <capture.pcap> <wordlist.txt>");
            return ExitCode::from(1);
        }
    };

    let log_level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).with_writer(std::io::stderr).init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
