//! ISDB-T International (6 MHz) physical channel plan.

use std::ops::RangeInclusive;

pub(crate) const VHF_CHANNELS: RangeInclusive<u32> = 7..=13;
pub(crate) const UHF_CHANNELS: RangeInclusive<u32> = 14..=69;

const CHANNEL_WIDTH_HZ: u64 = 6_000_000;
const VHF_BASE_HZ: u64 = 177_000_000;
const UHF_BASE_HZ: u64 = 473_000_000;
/// Offset of the carrier from the nominal channel edge used by the plan.
const CARRIER_OFFSET_HZ: u64 = 142_000;

/// Carrier frequency of a physical channel, or `None` outside 7-69.
pub(crate) fn channel_frequency(channel: u32) -> Option<u64> {
    let (base, first) = if VHF_CHANNELS.contains(&channel) {
        (VHF_BASE_HZ, *VHF_CHANNELS.start())
    } else if UHF_CHANNELS.contains(&channel) {
        (UHF_BASE_HZ, *UHF_CHANNELS.start())
    } else {
        return None;
    };
    Some(base + u64::from(channel - first) * CHANNEL_WIDTH_HZ + CARRIER_OFFSET_HZ)
}

/// Channels visited by a scan, in ascending order.
pub(crate) fn scan_channels(include_vhf: bool) -> impl Iterator<Item = u32> {
    let vhf = if include_vhf { VHF_CHANNELS } else { 1..=0 };
    vhf.chain(UHF_CHANNELS)
}
