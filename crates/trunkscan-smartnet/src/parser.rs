//! Stateful recognition of SmartNet control-channel messages
//!
//! The control channel delivers one-, two-, and three-word messages over a
//! lossy link. Words arrive through a bounded lookahead queue; recognition
//! only runs while the queue is full, so multi-word arms always have enough
//! lookahead. Lost sync is signalled upstream as a bad-OSW message, which
//! clears the queue and leaves a reset marker behind; idles the repeater
//! interleaves into multi-word messages are detected and removed in place.
//!
//! Putback discipline: when a multi-word arm mismatches after popping extra
//! words, the extras go back to the front in reverse order of popping. The
//! outer dispatcher pushes the head word back only when no arm matched at
//! all.

use crate::bandplan::Bandplan;
use crate::osw::{OSW_QUEUE_SIZE, Osw, OswQueue};
use crate::state::TrunkingState;
use serde_json::json;
use tracing::{debug, info, trace};
use trunkscan_core::types::{MessageType, TALKGROUP_BASE_MASK, TrunkMessage};

/// Protocol discriminator carried in the upper 16 bits of the message type
pub const PROTO_SMARTNET: i64 = 2;

/// Message subtype: decoded OSW
pub const MSG_OSW: i16 = 0;

/// Message subtype: control-channel timeout
pub const MSG_TIMEOUT: i16 = -1;

/// Message subtype: lost sync or CRC failure upstream
pub const MSG_BAD_OSW: i16 = -2;

/// Second-word opcodes that may legitimately follow an `0x308` after an
/// interleaved idle; used to decide whether the idle can be removed.
const IDLE_CONTINUATION_CMDS: [u16; 13] = [
    0x30a, 0x30b, 0x30d, 0x310, 0x311, 0x317, 0x318, 0x319, 0x31a, 0x320, 0x322, 0x32e, 0x340,
];

/// Envelope delivered by the demodulated control-channel graph
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Packed type: protocol in the upper 16 bits, subtype in the lower 16
    pub msg_type: i64,

    /// Message body; at least five bytes for an OSW
    pub body: Vec<u8>,

    /// Upstream timestamp, fractional seconds
    pub ts: f64,
}

impl ChannelMessage {
    const fn pack(subtype: i16) -> i64 {
        (PROTO_SMARTNET << 16) | (subtype as u16 as i64)
    }

    /// Build an OSW message with a big-endian five-byte body
    #[must_use]
    pub fn osw(addr: u16, grp: bool, cmd: u16, ts: f64) -> Self {
        Self {
            msg_type: Self::pack(MSG_OSW),
            body: vec![
                (addr >> 8) as u8,
                (addr & 0xFF) as u8,
                u8::from(grp),
                (cmd >> 8) as u8,
                (cmd & 0xFF) as u8,
            ],
            ts,
        }
    }

    /// Build a bad-OSW (lost sync) message
    #[must_use]
    pub const fn bad_osw(ts: f64) -> Self {
        Self {
            msg_type: Self::pack(MSG_BAD_OSW),
            body: Vec::new(),
            ts,
        }
    }

    /// Build a timeout message
    #[must_use]
    pub const fn timeout(ts: f64) -> Self {
        Self {
            msg_type: Self::pack(MSG_TIMEOUT),
            body: Vec::new(),
            ts,
        }
    }
}

/// Encryption and emergency flags carried in the low talkgroup bits
fn grant_flags(raw_tgid: u16) -> (bool, bool) {
    let encrypted = (raw_tgid >> 3) & 1 == 1;
    let options = raw_tgid & 0x7;
    let emergency = matches!(options, 2 | 4 | 5);
    (encrypted, emergency)
}

/// Dispatcher-created patch groups carry 3 or 4 in the low option bits
const fn is_patch_group(addr: u16) -> bool {
    matches!(addr & 0x7, 3 | 4)
}

/// Multiselect groups carry 5 or 7 in the low option bits
const fn is_multiselect_group(addr: u16) -> bool {
    matches!(addr & 0x7, 5 | 7)
}

/// Human-readable reason for the enumerated call-denial codes
const fn denial_reason(opcode: u16) -> Option<&'static str> {
    match opcode {
        0x2c04 => Some("invalid talkgroup"),
        0x2c11 => Some("announcement listen only"),
        0x2c12 => Some("clear tx only"),
        0x2c13 => Some("listen only"),
        0x2c14 => Some("no private call"),
        0x2c15 => Some("private call invalid id"),
        0x2c16 => Some("no interconnect"),
        0x2c20 => Some("unsupported mode"),
        0x2c41 => Some("private call target offline"),
        0x2c47 => Some("group busy, call in progress"),
        0x2c48 => Some("private call ring target offline"),
        0x2c4a => Some("forbidden on site"),
        0x2c4e => Some("call alert invalid id"),
        0x2c4f => Some("call alert target offline"),
        0x2c56 => Some("wrong modulation"),
        0x2c60 => Some("omnilink trespass rejected"),
        0x2c65 => Some("radio id denied"),
        0x2c66 => Some("group busy, call starting"),
        0x2c6a => Some("talkgroup id denied"),
        0x2c90 => Some("private call target busy"),
        _ => None,
    }
}

/// SmartNet control-channel parser for one configured system
#[derive(Debug)]
pub struct SmartnetParser {
    sys_num: i32,
    bandplan: Bandplan,
    queue: OswQueue,
    state: TrunkingState,
    osw_count: u64,
    last_osw: f64,
    rx_cc_freq: f64,
    rx_sys_id: u32,
    rx_site_id: u32,
}

impl SmartnetParser {
    /// Create a parser for the given system and bandplan
    #[must_use]
    pub fn new(sys_num: i32, bandplan: Bandplan) -> Self {
        Self {
            sys_num,
            bandplan,
            queue: OswQueue::new(),
            state: TrunkingState::new(),
            osw_count: 0,
            last_osw: 0.0,
            rx_cc_freq: 0.0,
            rx_sys_id: 0,
            rx_site_id: 0,
        }
    }

    /// Feed one upstream message, returning any trunking events it
    /// completed. Also drives the state-table expiry sweep.
    pub fn handle_message(&mut self, msg: &ChannelMessage) -> Vec<TrunkMessage> {
        let mut messages = Vec::new();

        if msg.msg_type >> 16 != PROTO_SMARTNET {
            return messages;
        }

        match (msg.msg_type & 0xFFFF) as i16 {
            MSG_TIMEOUT => trace!("control channel timeout"),
            MSG_BAD_OSW => {
                self.queue.clear();
                self.queue.push_back(Osw::reset_marker(msg.ts));
            }
            MSG_OSW => {
                if msg.body.len() >= 5 {
                    let addr = (u16::from(msg.body[0]) << 8) | u16::from(msg.body[1]);
                    let grp = msg.body[2] != 0;
                    let cmd = (u16::from(msg.body[3]) << 8) | u16::from(msg.body[4]);
                    if self.osw_count == 0 {
                        debug!(bandplan = ?self.bandplan, "control channel up, first OSW");
                    }
                    self.queue
                        .push_back(Osw::decode(addr, grp, cmd, msg.ts, &self.bandplan));
                    self.osw_count += 1;
                    self.last_osw = msg.ts;
                }
            }
            _ => {}
        }

        messages.extend(self.process_osws(msg.ts));
        self.state.maybe_expire(msg.ts);
        messages
    }

    /// Run one recognition pass over the queued words
    ///
    /// Does nothing until the queue is full: multi-word arms rely on that
    /// lookahead being present.
    fn process_osws(&mut self, curr_time: f64) -> Vec<TrunkMessage> {
        let mut messages = Vec::new();
        if !self.queue.is_full() {
            return messages;
        }
        let Some(mut osw2) = self.queue.pop_front() else {
            return messages;
        };

        let mut is_unknown_osw = false;
        let mut reset_marker: Option<Osw> = None;

        // Consume reset markers at the head. A single reset leaves exactly
        // capacity-2 words once its replacement is popped; with more than
        // one, put a marker back and wait for the queue to refill.
        while osw2.is_reset() {
            reset_marker = Some(osw2);
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            osw2 = next;
            if self.queue.len() == OSW_QUEUE_SIZE - 2 {
                trace!("queue reset");
            } else {
                if let Some(marker) = reset_marker {
                    self.queue.push_front(marker);
                }
                trace!("multiple queue resets, waiting for refill");
                return messages;
            }
        }

        // OBT systems use explicit messages carrying the tx and rx channels
        // separately; check those first and fall back to common parsing.
        if self.bandplan.is_obt() && osw2.ch_tx {
            self.process_obt(osw2, &mut messages, &mut is_unknown_osw);
        }
        // One-OSW voice update
        else if osw2.ch_rx && osw2.grp {
            let dst_tgid = osw2.addr;
            let vc_freq = osw2.f_rx;
            let (encrypted, emergency) = grant_flags(dst_tgid);

            messages.push(self.trunk_message(
                MessageType::Update,
                vc_freq,
                dst_tgid,
                0,
                encrypted,
                emergency,
            ));
            self.state
                .update_voice_frequency(osw2.ts, vc_freq, u32::from(dst_tgid), None, None);

            trace!(tgid = dst_tgid, freq = vc_freq, "voice update");
        }
        // One-OSW control channel broadcast
        else if osw2.ch_rx && !osw2.grp && (osw2.addr & 0xFF00) == 0x1F00 {
            self.rx_cc_freq = (osw2.f_rx * 1_000_000.0).round();
            trace!(freq = osw2.f_rx, "control channel broadcast");
        }
        // One-OSW system idle
        else if osw2.cmd == 0x2F8 && !osw2.grp {
            trace!("system idle");
        } else if osw2.cmd == 0x300 && osw2.grp {
            trace!(tgid = osw2.addr, "group busy queued");
        } else if osw2.cmd == 0x303 && osw2.grp {
            trace!(tgid = osw2.addr, "emergency busy queued");
        }
        // Two- or three-OSW messages
        else if osw2.cmd == 0x308 {
            self.process_cmd_0x308(osw2, curr_time, &mut messages, &mut is_unknown_osw);
        } else if osw2.cmd == 0x321 {
            self.process_cmd_0x321(osw2, &mut messages, &mut is_unknown_osw);
        } else if osw2.cmd == 0x324 && osw2.grp {
            trace!(src = osw2.addr, "interconnect reject");
        } else if osw2.cmd == 0x32A && osw2.grp {
            trace!(target = osw2.addr, "send affiliation request");
        } else if osw2.cmd == 0x32B && !osw2.grp {
            trace!(sys = %format!("{:#06x}", osw2.addr), "system id / scan marker");
        } else if osw2.cmd == 0x32C && !osw2.grp {
            trace!(src = osw2.addr, "roaming");
        } else if (0x360..=0x39F).contains(&osw2.cmd) {
            let site = osw2.cmd - 0x360 + 1;
            trace!(site, "AMSS site");
        } else if osw2.cmd == 0x3A0 && osw2.grp {
            let opcode = (osw2.addr & 0xF000) >> 12;
            trace!(opcode = %format!("{opcode:#03x}"), "BSI / diagnostic");
        } else if osw2.cmd == 0x3BF || osw2.cmd == 0x3C0 {
            trace!("system status");
        } else {
            is_unknown_osw = true;
            self.queue.push_front(osw2);
        }

        if is_unknown_osw && let Some(marker) = reset_marker {
            // Keep the reset at the head so following unknown OSWs are still
            // attributed to the lost sync rather than treated as decode gaps.
            self.queue.push_front(marker);
            info!(
                cmd = %format!("{:#05x}", osw2.cmd),
                addr = %format!("{:#06x}", osw2.addr),
                grp = osw2.grp,
                "unknown OSW, likely caused by lost sync"
            );
        }

        messages
    }

    /// OBT-specific arms: explicit tx/rx channel pairs
    fn process_obt(&mut self, osw2: Osw, messages: &mut Vec<TrunkMessage>, is_unknown: &mut bool) {
        let Some(osw1) = self.queue.pop_front() else {
            return;
        };

        // Three-OSW system information
        if osw1.cmd == 0x320 && osw2.grp && osw1.grp {
            let Some(osw0) = self.queue.pop_front() else {
                return;
            };
            if osw0.cmd == 0x30B && (osw0.addr & 0xFC00) == 0x6000 {
                let system = osw2.addr;
                let site = u32::from((osw1.addr & 0xFC00) >> 10) + 1;
                let cc_rx_chan = osw0.addr & 0x3FF;
                let cc_rx_freq = self.bandplan.freq_mhz(cc_rx_chan, false);
                let cc_tx_freq = osw2.f_tx;

                self.rx_sys_id = u32::from(system);
                if osw0.grp {
                    self.state
                        .add_adjacent_site(osw1.ts, site, cc_rx_freq, cc_tx_freq);
                    debug!(
                        sys = %format!("{system:#06x}"),
                        site,
                        freq = cc_rx_freq,
                        "OBT adjacent site"
                    );
                } else {
                    self.rx_site_id = site;
                    self.state
                        .add_alternate_cc_freq(osw1.ts, cc_rx_freq, cc_tx_freq);
                    debug!(
                        sys = %format!("{system:#06x}"),
                        site,
                        freq = cc_rx_freq,
                        "OBT alternate control channel"
                    );
                }
            } else {
                *is_unknown = true;
                self.queue.push_front(osw0);
            }
        }
        // Two-OSW system idle
        else if osw1.cmd == 0x2F8 && osw2.ch_tx {
            trace!("OBT system idle");
        }
        // Two-OSW group voice grant with explicit rx and tx channels
        else if osw2.ch_tx && osw1.ch_rx && osw1.grp && osw1.addr != 0 && osw2.addr != 0 {
            let mode: i8 = if osw2.grp { 0 } else { 1 };
            let src_rid = osw2.addr;
            let dst_tgid = osw1.addr;
            let vc_rx_freq = osw1.f_rx;
            let (encrypted, emergency) = grant_flags(dst_tgid);

            messages.push(self.trunk_message(
                MessageType::Grant,
                vc_rx_freq,
                dst_tgid,
                src_rid,
                encrypted,
                emergency,
            ));
            self.state.update_voice_frequency(
                osw1.ts,
                vc_rx_freq,
                u32::from(dst_tgid),
                Some(u32::from(src_rid)),
                Some(mode),
            );

            debug!(
                src = src_rid,
                tgid = dst_tgid,
                freq = vc_rx_freq,
                "OBT group grant"
            );
        }
        // Two-OSW private or interconnect call, sent for the call duration
        else if osw2.ch_tx && osw1.ch_rx && !osw1.grp && osw1.addr != 0 && osw2.addr != 0 {
            if osw2.grp {
                trace!(src = osw1.addr, dst = osw2.addr, "OBT private call");
            } else {
                trace!(src = osw1.addr, dst = osw2.addr, "OBT interconnect call");
            }
        } else {
            *is_unknown = true;
            self.queue.push_front(osw1);
        }
    }

    /// Two- and three-OSW messages led by command `0x308`
    fn process_cmd_0x308(
        &mut self,
        osw2: Osw,
        curr_time: f64,
        messages: &mut Vec<TrunkMessage>,
        is_unknown: &mut bool,
    ) {
        let Some(osw1) = self.queue.pop_front() else {
            self.queue.push_front(osw2);
            return;
        };

        // Two-OSW system id + control channel broadcast
        if osw1.ch_rx && !osw1.grp && (osw1.addr & 0xFF00) == 0x1F00 {
            self.rx_sys_id = u32::from(osw2.addr);
            self.rx_cc_freq = (osw1.f_rx * 1_000_000.0).round();
            trace!(
                sys = %format!("{:#06x}", self.rx_sys_id),
                freq = osw1.f_rx,
                "system id + control channel broadcast"
            );
        }
        // Two-OSW analog group voice grant
        else if osw1.ch_rx && osw1.grp && osw1.addr != 0 && osw2.addr != 0 {
            let src_rid = osw2.addr;
            let dst_tgid = osw1.addr;
            let vc_freq = osw1.f_rx;
            let (encrypted, emergency) = grant_flags(dst_tgid);

            messages.push(self.trunk_message(
                MessageType::Grant,
                vc_freq,
                dst_tgid,
                src_rid,
                encrypted,
                emergency,
            ));
            self.state.update_voice_frequency(
                osw1.ts,
                vc_freq,
                u32::from(dst_tgid),
                Some(u32::from(src_rid)),
                Some(0),
            );

            debug!(
                src = src_rid,
                tgid = dst_tgid,
                freq = vc_freq,
                "analog group grant"
            );
        }
        // Two-OSW analog private call, sent for the call duration
        else if osw1.ch_rx && !osw1.grp && osw1.addr != 0 && osw2.addr != 0 {
            trace!(src = osw1.addr, dst = osw2.addr, "analog private call");
        }
        // An idle may have been interleaved into a multi-word message:
        // peek the following word, and if it could continue an 0x308
        // message, drop the idle and retry with the continuation adjacent.
        else if osw1.cmd == 0x2F8 {
            let Some(osw0) = self.queue.pop_front() else {
                self.queue.push_front(osw1);
                self.queue.push_front(osw2);
                return;
            };
            if IDLE_CONTINUATION_CMDS.contains(&osw0.cmd) || osw0.ch_rx {
                self.queue.push_front(osw0);
                self.queue.push_front(osw2);
                trace!("interleaved idle absorbed");
            } else {
                self.queue.push_front(osw0);
                self.queue.push_front(osw1);
                *is_unknown = true;
            }
        } else if osw1.cmd == 0x300 && osw1.grp {
            trace!(tgid = osw1.addr, "group busy queued");
        } else if osw1.cmd == 0x302 && !osw1.grp {
            trace!(target = osw1.addr, "private call busy queued");
        } else if osw1.cmd == 0x303 && osw1.grp {
            trace!(tgid = osw1.addr, "emergency busy queued");
        }
        // Two-OSW system idle that got separated and interleaved with a
        // different multi-word message: reorder it and put the message it
        // was interleaved with back for the next pass.
        else if osw1.cmd == 0x308 {
            let Some(osw0) = self.queue.pop_front() else {
                self.queue.push_front(osw1);
                self.queue.push_front(osw2);
                return;
            };
            if osw0.cmd == 0x2F8 {
                self.queue.push_front(osw1);
                trace!(src = osw2.addr, data = osw0.addr, "out-of-order idle");
            } else {
                *is_unknown = true;
                self.queue.push_front(osw0);
                self.queue.push_front(osw1);
            }
        } else if osw1.cmd == 0x30A && !osw1.grp && !osw2.grp {
            trace!("dynamic regroup");
        } else if osw1.cmd == 0x30B {
            self.process_cmd_0x308_0x30b(osw2, osw1, curr_time, is_unknown);
        } else if osw1.cmd == 0x30D && !osw1.grp && !osw2.grp {
            let src = osw2.addr;
            let tgid = osw1.addr & TALKGROUP_BASE_MASK as u16;
            let opcode = osw1.addr & 0xF;
            trace!(
                src,
                tgid,
                opcode = %format!("{opcode:#03x}"),
                "status / emergency / regroup acknowledgement"
            );
        } else if osw1.cmd == 0x310 && !osw1.grp && !osw2.grp {
            trace!(
                src = osw2.addr,
                tgid = osw1.addr & TALKGROUP_BASE_MASK as u16,
                "affiliation"
            );
        } else if osw1.cmd == 0x311 && !osw1.grp && !osw2.grp {
            trace!(
                src = osw2.addr,
                tgid = osw1.addr & TALKGROUP_BASE_MASK as u16,
                number = (osw1.addr & 0xF) + 1,
                "message"
            );
        } else if osw1.cmd == 0x315 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "encrypted private call ring");
        } else if osw1.cmd == 0x317 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "clear private call ring");
        } else if osw1.cmd == 0x318 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "private call ring acknowledgement");
        } else if osw1.cmd == 0x319 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "call alert");
        } else if osw1.cmd == 0x31A && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "call alert acknowledgement");
        } else if osw1.cmd == 0x31B && !osw1.grp && !osw2.grp {
            trace!(
                sys = %format!("{:#06x}", osw1.addr),
                src = osw2.addr,
                "omnilink trespass permitted"
            );
        }
        // Three-OSW system information
        else if osw1.cmd == 0x320 {
            let Some(osw0) = self.queue.pop_front() else {
                self.queue.push_front(osw1);
                self.queue.push_front(osw2);
                return;
            };
            if osw0.cmd == 0x2F8 && !osw0.grp {
                // A one-OSW idle delayed by two words landed between the
                // last two words of this message; skip past it.
                if let Some(data) = self.queue.pop_front() {
                    trace!(data = data.addr, "delayed idle inside system information");
                }
            } else if osw0.cmd == 0x30B && (osw0.addr & 0xFC00) == 0x6000 {
                trace!("adjacent site");
            } else {
                *is_unknown = true;
                self.queue.push_front(osw0);
            }
        } else if osw1.cmd == 0x322 && osw2.grp && osw1.grp {
            // Two-OSW date/time broadcast
            let year = ((osw2.addr >> 9) & 0x7F) + 2000;
            let month = (osw2.addr & 0x1E0) >> 5;
            let day = osw2.addr & 0x1F;
            let weekday = (osw1.addr & 0xE000) >> 13;
            let hour = (osw1.addr & 0x1F00) >> 8;
            let minute = osw1.addr & 0xFF;
            trace!(year, month, day, weekday, hour, minute, "network date/time");
        } else if osw1.cmd == 0x32E && osw2.grp && osw1.grp {
            trace!(
                src = osw2.addr,
                tgid = osw1.addr & TALKGROUP_BASE_MASK as u16,
                "emergency ptt"
            );
        } else if osw1.cmd == 0x340
            && osw2.grp
            && osw1.grp
            && (is_patch_group(osw2.addr) || is_multiselect_group(osw2.addr))
        {
            // Two-OSW patch / multiselect
            let tgid = u32::from(osw1.addr & 0xFFF) << 4;
            let sub_tgid = u32::from(osw2.addr) & TALKGROUP_BASE_MASK;
            let mode = (osw2.addr & 0xF) as i8;
            self.state.add_patch(osw2.ts, tgid, sub_tgid, mode);
            debug!(tgid, sub_tgid, mode, "patch/multiselect");
        } else {
            *is_unknown = true;
            self.queue.push_front(osw1);
        }
    }

    /// The `0x308` + `0x30b` family: system id broadcasts, adjacent and
    /// alternate control channels, patch cancels, and extended functions
    fn process_cmd_0x308_0x30b(
        &mut self,
        osw2: Osw,
        osw1: Osw,
        curr_time: f64,
        is_unknown: &mut bool,
    ) {
        let Some(mut osw0) = self.queue.pop_front() else {
            self.queue.push_front(osw1);
            self.queue.push_front(osw2);
            return;
        };

        // A one-OSW idle delayed by two words may sit between the last two
        // words of a three-OSW message; skip it and continue with the word
        // that follows.
        if osw0.cmd == 0x2F8 && !osw0.grp {
            let Some(next) = self.queue.pop_front() else {
                self.queue.push_front(osw1);
                self.queue.push_front(osw2);
                return;
            };
            trace!(data = next.addr, "delayed idle skipped");
            osw0 = next;
        }

        // Three-OSW system id + control channel broadcast
        if osw1.grp
            && !osw0.grp
            && osw0.ch_rx
            && (osw0.addr & 0xFF00) == 0x1F00
            && (osw1.addr & 0xFC00) == 0x2800
            && (osw1.addr & 0x3FF) == osw0.cmd
        {
            self.rx_sys_id = u32::from(osw2.addr);
            self.rx_cc_freq = (osw0.f_rx * 1_000_000.0).round();
            trace!(
                sys = %format!("{:#06x}", self.rx_sys_id),
                freq = osw0.f_rx,
                "system id + control channel broadcast (3-word)"
            );
        } else {
            // Two-OSW variants; the third word was not part of the message
            self.queue.push_front(osw0);

            if (osw1.addr & 0xFC00) == 0x2800 && osw1.grp {
                self.rx_sys_id = u32::from(osw2.addr);
                self.rx_cc_freq = (osw0.f_rx * 1_000_000.0).round();
                trace!(
                    sys = %format!("{:#06x}", self.rx_sys_id),
                    "system id + control channel broadcast"
                );
            } else if (osw1.addr & 0xFC00) == 0x6000 {
                // Adjacent site or alternate control channel announcement
                let site = u32::from((osw1.addr & 0xFC00) >> 10) + 1;
                let cc_rx_chan = osw1.addr & 0x3FF;
                let cc_rx_freq = self.bandplan.freq_mhz(cc_rx_chan, false);
                let cc_tx_freq = osw2.f_tx;
                self.rx_sys_id = u32::from(osw2.addr);
                if osw1.grp {
                    self.state
                        .add_adjacent_site(curr_time, site, cc_rx_freq, cc_tx_freq);
                } else {
                    self.state
                        .add_alternate_cc_freq(curr_time, cc_rx_freq, cc_tx_freq);
                }
                debug!(
                    sys = %format!("{:#06x}", self.rx_sys_id),
                    freq = cc_rx_freq,
                    adjacent = osw1.grp,
                    "adjacent / alternate control channel"
                );
            } else if osw1.grp {
                // Extended functions on groups
                if osw1.addr == 0x2021
                    && (is_patch_group(osw2.addr) || is_multiselect_group(osw2.addr))
                {
                    let tgid = u32::from(osw2.addr) & TALKGROUP_BASE_MASK;
                    self.state.delete_patches(tgid);
                    debug!(tgid, "patch/multiselect cancel");
                } else {
                    trace!(tgid = osw2.addr, "group extended function");
                }
            } else {
                Self::log_individual_extended_function(osw1.addr, osw2.addr);
            }
        }
    }

    /// Extended functions addressed to individual radios (log only)
    fn log_individual_extended_function(opcode: u16, target: u16) {
        match opcode {
            0x261B => trace!(target, "radio check"),
            0x261C => trace!(src = target, "deaffiliation"),
            0x26E0..=0x26E7 => {
                trace!(src = target, status = (opcode & 0x7) + 1, "status acknowledgement");
            }
            0x26E8 => trace!(src = target, "emergency alarm acknowledgement"),
            0x26F0..=0x26FF => {
                trace!(src = target, number = (opcode & 0xF) + 1, "message acknowledgement");
            }
            0x8301 => trace!(target, "failsoft assign"),
            0x8302 => trace!(target, "selector unlocked"),
            0x8303 => trace!(target, "selector locked"),
            0x8305 => trace!(src = target, "failsoft canceled"),
            0x8306 => trace!(src = target, "radio inhibited"),
            0x8307 => trace!(src = target, "radio uninhibited"),
            0x8312 => trace!(target, "selector unlock"),
            0x8313 => trace!(target, "selector lock"),
            0x8315 => trace!(target, "failsoft cancel"),
            0x8316 => trace!(target, "radio inhibit"),
            0x8317 => trace!(target, "radio uninhibit"),
            _ if (opcode & 0xFC00) == 0x2C00 => {
                if let Some(reason) = denial_reason(opcode) {
                    trace!(src = target, reason, "call denied");
                } else {
                    trace!(
                        src = target,
                        code = %format!("{:#05x}", opcode & 0x3FF),
                        "call denied"
                    );
                }
            }
            _ => trace!(
                src = target,
                opcode = %format!("{opcode:#06x}"),
                "individual extended function"
            ),
        }
    }

    /// Two-OSW digital messages led by command `0x321`
    fn process_cmd_0x321(
        &mut self,
        osw2: Osw,
        messages: &mut Vec<TrunkMessage>,
        is_unknown: &mut bool,
    ) {
        let Some(osw1) = self.queue.pop_front() else {
            self.queue.push_front(osw2);
            return;
        };

        // Two-OSW digital group voice grant
        if osw1.ch_rx && osw2.grp && osw1.grp && osw1.addr != 0 {
            let src_rid = osw2.addr;
            let dst_tgid = osw1.addr;
            let vc_freq = osw1.f_rx;
            let (encrypted, emergency) = grant_flags(dst_tgid);

            messages.push(self.trunk_message(
                MessageType::Grant,
                vc_freq,
                dst_tgid,
                src_rid,
                encrypted,
                emergency,
            ));
            self.state.update_voice_frequency(
                osw1.ts,
                vc_freq,
                u32::from(dst_tgid),
                Some(u32::from(src_rid)),
                Some(1),
            );

            debug!(
                src = src_rid,
                tgid = dst_tgid,
                freq = vc_freq,
                "digital group grant"
            );
        }
        // Two-OSW digital private call, sent for the call duration
        else if osw1.ch_rx && !osw1.grp && osw1.addr != 0 && osw2.addr != 0 {
            trace!(src = osw1.addr, dst = osw2.addr, "digital private call");
        }
        // One- or two-OSW system idle; a private-call-ring continuation
        // means the idle was delayed into the middle of that message.
        else if osw1.cmd == 0x2F8 {
            let Some(osw0) = self.queue.pop_front() else {
                self.queue.push_front(osw1);
                self.queue.push_front(osw2);
                return;
            };
            if osw0.cmd == 0x317 || osw0.cmd == 0x318 {
                self.queue.push_front(osw0);
                self.queue.push_front(osw2);
                trace!(data = osw1.addr, "delayed idle inside digital message");
            } else {
                self.queue.push_front(osw0);
                trace!("digital system idle");
            }
        } else if osw1.cmd == 0x315 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "digital encrypted private call ring");
        } else if osw1.cmd == 0x317 && !osw1.grp && !osw2.grp {
            trace!(src = osw1.addr, dst = osw2.addr, "digital clear private call ring");
        } else {
            *is_unknown = true;
            self.queue.push_front(osw1);
        }
    }

    /// Build an outgoing event; the frequency is rounded to whole Hz
    fn trunk_message(
        &self,
        message_type: MessageType,
        freq_mhz: f64,
        talkgroup: u16,
        source: u16,
        encrypted: bool,
        emergency: bool,
    ) -> TrunkMessage {
        TrunkMessage::new(
            message_type,
            (freq_mhz * 1_000_000.0).round(),
            u32::from(talkgroup),
            u32::from(source),
            encrypted,
            emergency,
            self.sys_num,
            self.rx_sys_id,
            self.rx_site_id,
        )
    }

    /// Control channel frequency last announced, Hz
    #[must_use]
    pub const fn control_channel_freq(&self) -> f64 {
        self.rx_cc_freq
    }

    /// System id last announced on the control channel
    #[must_use]
    pub const fn sys_id(&self) -> u32 {
        self.rx_sys_id
    }

    /// Site id last announced on the control channel
    #[must_use]
    pub const fn site_id(&self) -> u32 {
        self.rx_site_id
    }

    /// Number of OSWs decoded since startup
    #[must_use]
    pub const fn osw_count(&self) -> u64 {
        self.osw_count
    }

    /// Trunking state tables
    #[must_use]
    pub const fn state(&self) -> &TrunkingState {
        &self.state
    }

    /// Status snapshot for operator displays
    #[must_use]
    pub fn status_json(&self) -> serde_json::Value {
        let mut top_line = format!("Smartnet System ID {}", self.rx_sys_id);
        if self.rx_site_id != 0 {
            top_line.push_str(&format!(" Site {}", self.rx_site_id));
        }
        top_line.push_str(&format!(" OSW count {}", self.osw_count));

        let mut freqs = serde_json::Map::new();
        for vf in self.state.voice_frequencies() {
            freqs.insert(
                vf.frequency.to_string(),
                json!({
                    "tgid": vf.tgid,
                    "mode": vf.mode,
                    "count": vf.counter,
                    "time": vf.last_seen,
                }),
            );
        }

        json!({
            "type": "smartnet",
            "system": self.sys_num,
            "top_line": top_line,
            "frequencies": freqs,
        })
    }
}
