//! Fixed species lookup table.
//!
//! Recordings are labelled by the first four characters of their file name;
//! that label selects a species id. Id 0 is "unknown".

/// Id assigned to anything that is not in the table.
pub const UNKNOWN: u32 = 0;

/// Length of the file-name prefix used as a source label.
pub const LABEL_LEN: usize = 4;

struct Species {
    short: &'static str,
    latin: &'static str,
    local: &'static str,
}

const TABLE: [Species; 5] = [
    Species {
        short: "UNKN",
        latin: "Unknown",
        local: "Nieznany",
    },
    Species {
        short: "BOGA",
        latin: "Parus major",
        local: "Bogatka",
    },
    Species {
        short: "RUDZ",
        latin: "Erithacus rubecula",
        local: "Rudzik",
    },
    Species {
        short: "MYSI",
        latin: "Regulus regulus",
        local: "Mysikrolik",
    },
    Species {
        short: "MODR",
        latin: "Parus caeruleus",
        local: "Modraszka",
    },
];

fn entry(id: u32) -> &'static Species {
    TABLE.get(id as usize).unwrap_or(&TABLE[UNKNOWN as usize])
}

/// Species id for a short label; unrecognized labels map to [`UNKNOWN`].
pub fn id_from_label(label: &str) -> u32 {
    TABLE
        .iter()
        .position(|species| species.short == label)
        .filter(|&index| index != UNKNOWN as usize)
        .map(|index| index as u32)
        .unwrap_or(UNKNOWN)
}

pub fn short_name(id: u32) -> &'static str {
    entry(id).short
}

pub fn latin_name(id: u32) -> &'static str {
    entry(id).latin
}

pub fn local_name(id: u32) -> &'static str {
    entry(id).local
}

/// Source label for a file: up to [`LABEL_LEN`] characters of its name.
pub fn label_from_path(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().chars().take(LABEL_LEN).collect())
        .unwrap_or_default()
}
