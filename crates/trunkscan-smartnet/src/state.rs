//! Trunking state tables
//!
//! Tracks what the control channel has announced: which talkgroup is active
//! on which voice frequency, dispatcher-created patches, adjacent sites, and
//! alternate control channels. Entries age out on a TTL; the sweep runs at
//! most once per second of wall-clock time. The tables are owned by the
//! parser thread, so no locking is involved.

use std::collections::HashMap;
use trunkscan_core::types::{DEFAULT_TALKGROUP_PRIORITY, TALKGROUP_BASE_MASK};

/// Talkgroup entries expire after this many seconds without an update
pub const TALKGROUP_TTL_S: f64 = 3.0;

/// Patch entries expire after this many seconds without a refresh
pub const PATCH_TTL_S: f64 = 5.0;

/// Adjacent-site entries expire after this many seconds
pub const ADJACENT_SITE_TTL_S: f64 = 60.0;

/// Alternate-control-channel entries expire after this many seconds
pub const ALT_CC_TTL_S: f64 = 60.0;

/// Minimum interval between expiry sweeps, seconds
pub const EXPIRY_INTERVAL_S: f64 = 1.0;

/// Tracked state of a talkgroup heard on the control channel
#[derive(Debug, Clone, PartialEq)]
pub struct TalkgroupInfo {
    /// Base talkgroup id (low four bits masked off)
    pub tgid: u32,

    /// Priority, defaulted until a catalog says otherwise
    pub priority: i32,

    /// Last source radio heard on the talkgroup
    pub srcaddr: u32,

    /// Timestamp of the last grant or update
    pub last_seen: f64,

    /// Time the talkgroup was released; updates older than this are stale
    pub release_time: f64,

    /// Voice mode, -1 until known (0 analog, 1 digital)
    pub mode: i8,

    /// Status flags from the low four bits of the raw talkgroup id
    pub status: u8,

    /// Last granted voice frequency, Hz
    pub frequency: i64,
}

impl TalkgroupInfo {
    fn new(tgid: u32) -> Self {
        Self {
            tgid,
            priority: DEFAULT_TALKGROUP_PRIORITY,
            srcaddr: 0,
            last_seen: 0.0,
            release_time: 0.0,
            mode: -1,
            status: 0,
            frequency: 0,
        }
    }
}

/// Tracked state of a voice frequency
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceFrequency {
    /// Frequency, Hz
    pub frequency: i64,

    /// Base talkgroup currently using the frequency
    pub tgid: u32,

    /// Status flags from the low four bits of the raw talkgroup id
    pub flags: u8,

    /// Voice mode, -1 until known
    pub mode: i8,

    /// Number of grants and updates seen for this frequency
    pub counter: u64,

    /// Timestamp of the last grant or update
    pub last_seen: f64,
}

/// A patch subscription: when the patched talkgroup was last refreshed and
/// in which mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchEntry {
    /// Last refresh timestamp
    pub time: f64,

    /// Voice mode announced with the patch
    pub mode: i8,
}

/// A neighboring site announced on the control channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjacentSite {
    /// Announcement timestamp
    pub time: f64,

    /// Control channel receive frequency, MHz
    pub cc_rx_freq: f64,

    /// Control channel transmit frequency, MHz
    pub cc_tx_freq: f64,
}

/// An alternate control channel for this site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlternateControlChannel {
    /// Announcement timestamp
    pub time: f64,

    /// Receive frequency, MHz
    pub cc_rx_freq: f64,

    /// Transmit frequency, MHz
    pub cc_tx_freq: f64,
}

/// All tables together, with the sweep clock
#[derive(Debug, Default)]
pub struct TrunkingState {
    talkgroups: HashMap<u32, TalkgroupInfo>,
    voice_frequencies: HashMap<i64, VoiceFrequency>,
    /// tgid -> sub_tgid -> entry
    patches: HashMap<u32, HashMap<u32, PatchEntry>>,
    adjacent_sites: HashMap<u32, AdjacentSite>,
    alternate_cc_freqs: HashMap<i64, AlternateControlChannel>,
    last_expiry_check: f64,
}

impl TrunkingState {
    /// Create empty tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant or update on a voice frequency, updating the
    /// talkgroup table (and any patched talkgroups) along the way.
    ///
    /// `freq_mhz` of 0.0 is ignored. `srcaddr`/`mode` are only applied when
    /// present.
    pub fn update_voice_frequency(
        &mut self,
        ts: f64,
        freq_mhz: f64,
        tgid: u32,
        srcaddr: Option<u32>,
        mode: Option<i8>,
    ) {
        if freq_mhz == 0.0 {
            return;
        }

        let frequency = (freq_mhz * 1_000_000.0).round() as i64;
        self.update_talkgroups(ts, frequency, tgid, srcaddr, mode);

        let base_tgid = tgid & TALKGROUP_BASE_MASK;
        let flags = (tgid & 0xF) as u8;

        let entry = self
            .voice_frequencies
            .entry(frequency)
            .or_insert(VoiceFrequency {
                frequency,
                tgid: base_tgid,
                flags,
                mode: -1,
                counter: 0,
                last_seen: ts,
            });
        if let Some(mode) = mode {
            entry.mode = mode;
        }
        entry.tgid = base_tgid;
        entry.flags = flags;
        entry.counter += 1;
        entry.last_seen = ts;
    }

    /// Update a talkgroup and propagate the update to its active patches
    pub fn update_talkgroups(
        &mut self,
        ts: f64,
        frequency: i64,
        tgid: u32,
        srcaddr: Option<u32>,
        mode: Option<i8>,
    ) {
        self.update_talkgroup(ts, frequency, tgid, srcaddr, mode);

        let base_tgid = tgid & TALKGROUP_BASE_MASK;
        let sub_tgids: Vec<u32> = self
            .patches
            .get(&base_tgid)
            .map(|subs| subs.keys().copied().collect())
            .unwrap_or_default();
        for sub_tgid in sub_tgids {
            self.update_talkgroup(ts, frequency, sub_tgid, srcaddr, mode);
        }
    }

    /// Update a single talkgroup entry. Returns false when the update is
    /// older than the talkgroup's release time and was skipped.
    pub fn update_talkgroup(
        &mut self,
        ts: f64,
        frequency: i64,
        tgid: u32,
        srcaddr: Option<u32>,
        mode: Option<i8>,
    ) -> bool {
        let base_tgid = tgid & TALKGROUP_BASE_MASK;
        let status = (tgid & 0xF) as u8;

        let entry = self
            .talkgroups
            .entry(base_tgid)
            .or_insert_with(|| TalkgroupInfo::new(base_tgid));
        if ts < entry.release_time {
            return false;
        }

        entry.last_seen = ts;
        entry.release_time = 0.0;
        entry.frequency = frequency;
        entry.status = status;
        if let Some(srcaddr) = srcaddr {
            entry.srcaddr = srcaddr;
        }
        if let Some(mode) = mode {
            entry.mode = mode;
        }

        true
    }

    /// Record a patch of `sub_tgid` onto `tgid`
    pub fn add_patch(&mut self, ts: f64, tgid: u32, sub_tgid: u32, mode: i8) {
        self.patches
            .entry(tgid)
            .or_default()
            .insert(sub_tgid, PatchEntry { time: ts, mode });
    }

    /// Drop every patch keyed on `tgid`
    pub fn delete_patches(&mut self, tgid: u32) {
        self.patches.remove(&tgid);
    }

    /// Record an adjacent-site announcement
    pub fn add_adjacent_site(&mut self, ts: f64, site: u32, cc_rx_freq: f64, cc_tx_freq: f64) {
        self.adjacent_sites.insert(
            site,
            AdjacentSite {
                time: ts,
                cc_rx_freq,
                cc_tx_freq,
            },
        );
    }

    /// Record an alternate-control-channel announcement, keyed by the
    /// receive frequency in Hz
    pub fn add_alternate_cc_freq(&mut self, ts: f64, cc_rx_freq: f64, cc_tx_freq: f64) {
        let key = (cc_rx_freq * 1_000_000.0).round() as i64;
        self.alternate_cc_freqs.insert(
            key,
            AlternateControlChannel {
                time: ts,
                cc_rx_freq,
                cc_tx_freq,
            },
        );
    }

    /// Sweep expired entries from every table. Rate-limited to once per
    /// [`EXPIRY_INTERVAL_S`]; calls in between are no-ops.
    pub fn maybe_expire(&mut self, now: f64) {
        if now < self.last_expiry_check + EXPIRY_INTERVAL_S {
            return;
        }
        self.last_expiry_check = now;

        self.talkgroups
            .retain(|_, info| now <= info.last_seen + TALKGROUP_TTL_S);

        for subs in self.patches.values_mut() {
            subs.retain(|_, entry| now <= entry.time + PATCH_TTL_S);
        }
        self.patches.retain(|_, subs| !subs.is_empty());

        self.adjacent_sites
            .retain(|_, site| now <= site.time + ADJACENT_SITE_TTL_S);

        self.alternate_cc_freqs
            .retain(|_, cc| now <= cc.time + ALT_CC_TTL_S);
    }

    /// Look up a talkgroup by base id
    #[must_use]
    pub fn talkgroup(&self, base_tgid: u32) -> Option<&TalkgroupInfo> {
        self.talkgroups.get(&base_tgid)
    }

    /// Look up a voice frequency by Hz
    #[must_use]
    pub fn voice_frequency(&self, frequency: i64) -> Option<&VoiceFrequency> {
        self.voice_frequencies.get(&frequency)
    }

    /// Active patch subscriptions keyed on `tgid`
    #[must_use]
    pub fn patches_for(&self, tgid: u32) -> Option<&HashMap<u32, PatchEntry>> {
        self.patches.get(&tgid)
    }

    /// Look up an adjacent site by site id
    #[must_use]
    pub fn adjacent_site(&self, site: u32) -> Option<&AdjacentSite> {
        self.adjacent_sites.get(&site)
    }

    /// Look up an alternate control channel by receive frequency in Hz
    #[must_use]
    pub fn alternate_cc(&self, frequency: i64) -> Option<&AlternateControlChannel> {
        self.alternate_cc_freqs.get(&frequency)
    }

    /// Iterate the voice-frequency table
    pub fn voice_frequencies(&self) -> impl Iterator<Item = &VoiceFrequency> {
        self.voice_frequencies.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_grant_updates_tables() {
        let mut state = TrunkingState::new();
        state.update_voice_frequency(10.0, 851.0125, 0x1234, Some(0x2BCD), Some(0));

        let tg = state.talkgroup(0x1230).expect("talkgroup tracked");
        assert_eq!(tg.frequency, 851_012_500);
        assert_eq!(tg.status, 4);
        assert_eq!(tg.srcaddr, 0x2BCD);
        assert_eq!(tg.mode, 0);
        assert_eq!(tg.release_time, 0.0);

        let vf = state.voice_frequency(851_012_500).expect("freq tracked");
        assert_eq!(vf.tgid, 0x1230);
        assert_eq!(vf.flags, 4);
        assert_eq!(vf.counter, 1);
    }

    #[test]
    fn test_zero_frequency_ignored() {
        let mut state = TrunkingState::new();
        state.update_voice_frequency(10.0, 0.0, 0x1230, None, None);
        assert!(state.talkgroup(0x1230).is_none());
    }

    #[test]
    fn test_release_time_guard() {
        let mut state = TrunkingState::new();
        state.update_talkgroup(10.0, 851_012_500, 0x1230, None, None);
        state
            .talkgroups
            .get_mut(&0x1230)
            .expect("entry exists")
            .release_time = 20.0;

        // An update from before the release is stale
        assert!(!state.update_talkgroup(15.0, 852_000_000, 0x1230, None, None));
        assert_eq!(state.talkgroup(0x1230).unwrap().frequency, 851_012_500);

        // A later update goes through and clears the release time
        assert!(state.update_talkgroup(25.0, 852_000_000, 0x1230, None, None));
        assert_eq!(state.talkgroup(0x1230).unwrap().release_time, 0.0);
    }

    #[test]
    fn test_patch_propagation() {
        let mut state = TrunkingState::new();
        state.add_patch(10.0, 0xABC0, 0x0100, 0);
        state.update_voice_frequency(11.0, 851.0125, 0xABC0, Some(99), Some(0));

        // The patched sub-talkgroup follows the patch target onto the freq
        let sub = state.talkgroup(0x0100).expect("sub tracked");
        assert_eq!(sub.frequency, 851_012_500);
        assert_eq!(sub.srcaddr, 99);
    }

    #[test]
    fn test_delete_patches() {
        let mut state = TrunkingState::new();
        state.add_patch(10.0, 0xABC0, 0x0100, 0);
        state.delete_patches(0xABC0);
        assert!(state.patches_for(0xABC0).is_none());
    }

    #[test]
    fn test_expiry_ttls() {
        let mut state = TrunkingState::new();
        state.update_voice_frequency(100.0, 851.0125, 0x1230, None, None);
        state.add_patch(100.0, 0xABC0, 0x0100, 0);
        state.add_adjacent_site(100.0, 3, 852.0, 807.0);
        state.add_alternate_cc_freq(100.0, 853.0, 808.0);

        // Just after the talkgroup TTL: talkgroup gone, the rest remain
        state.maybe_expire(103.5);
        assert!(state.talkgroup(0x1230).is_none());
        assert!(state.patches_for(0xABC0).is_some());
        assert!(state.adjacent_site(3).is_some());

        // Past the patch TTL
        state.maybe_expire(106.0);
        assert!(state.patches_for(0xABC0).is_none());
        assert!(state.adjacent_site(3).is_some());

        // Past the 60 s TTLs
        state.maybe_expire(161.0);
        assert!(state.adjacent_site(3).is_none());
        assert!(state.alternate_cc(853_000_000).is_none());
    }

    #[test]
    fn test_expiry_sweep_rate_limited() {
        let mut state = TrunkingState::new();
        state.maybe_expire(100.0);
        state.update_voice_frequency(90.0, 851.0125, 0x1230, None, None);

        // Within one second of the last sweep nothing is removed, even
        // though the entry is already past its TTL
        state.maybe_expire(100.5);
        assert!(state.talkgroup(0x1230).is_some());

        state.maybe_expire(101.5);
        assert!(state.talkgroup(0x1230).is_none());
    }

    #[test]
    fn test_voice_frequency_counter_increments() {
        let mut state = TrunkingState::new();
        state.update_voice_frequency(10.0, 851.0125, 0x1230, None, None);
        state.update_voice_frequency(11.0, 851.0125, 0x1230, None, Some(1));

        let vf = state.voice_frequency(851_012_500).unwrap();
        assert_eq!(vf.counter, 2);
        assert_eq!(vf.mode, 1);
        assert_eq!(vf.last_seen, 11.0);
    }
}
