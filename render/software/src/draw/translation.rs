//! Player colour remapping. The green ramp of the palette is swapped for
//! another ramp, one table per alternate colour.

/// First and last palette entries of the green ramp
const GREEN_START: usize = 0x70;
const GREEN_END: usize = 0x7f;

/// Grey, brown and red ramps
const RAMPS: [u8; 3] = [0x60, 0x40, 0x20];

/// Doom function name `R_InitTranslationTables`
pub fn translation_tables() -> Vec<[u8; 256]> {
    RAMPS
        .iter()
        .map(|ramp| {
            let mut table = [0u8; 256];
            for (i, entry) in table.iter_mut().enumerate() {
                *entry = if (GREEN_START..=GREEN_END).contains(&i) {
                    ramp + (i & 0xf) as u8
                } else {
                    i as u8
                };
            }
            table
        })
        .collect()
}
