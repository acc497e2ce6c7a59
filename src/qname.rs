//! Read group keys parsed from Illumina style read names.

/// Field separator in read names (`flowcell:lane:tile:x:y`).
pub const DELIMITER: u8 = b':';

/// Derive a read group value from a read name by joining the first two fields with `_`.
///
/// `fc7:3:1101:1000` becomes `fc7_3`. A name without any delimiter has no lane field and yields
/// an empty string, which callers treat as "no read group".
pub fn derive_read_group(name: &[u8]) -> String {
    let mut fields = name.splitn(3, |&b| b == DELIMITER);
    match (fields.next(), fields.next()) {
        (Some(flowcell), Some(lane)) => {
            let mut value = String::with_capacity(flowcell.len() + lane.len() + 1);
            value.push_str(&String::from_utf8_lossy(flowcell));
            value.push('_');
            value.push_str(&String::from_utf8_lossy(lane));
            value
        }
        _ => String::new(),
    }
}
