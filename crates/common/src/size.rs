// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Human-readable byte sizes for listings

/// Format a byte count the way storage listings show it.
///
/// Small counts stay in bytes; larger ones switch unit once they pass 200 of
/// the previous unit.
pub fn pretty_size(nb_bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let bytes = nb_bytes as f64;
    if nb_bytes < 150 {
        format!("{nb_bytes} bytes")
    } else if bytes < KB * 200.0 {
        format!("{:.2} kB", bytes / KB)
    } else if bytes < KB * KB * 200.0 {
        format!("{:.2} MB", bytes / (KB * KB))
    } else {
        format!("{:.2} GB", bytes / (KB * KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_size_units() {
        assert_eq!(pretty_size(0), "0 bytes");
        assert_eq!(pretty_size(149), "149 bytes");
        assert_eq!(pretty_size(150), "0.15 kB");
        assert_eq!(pretty_size(2048), "2.00 kB");
        assert_eq!(pretty_size(1024 * 1024), "1.00 MB");
        assert_eq!(pretty_size(300 * 1024 * 1024), "0.29 GB");
    }
}
