//! Key layout of the durable store.
//!
//! All keys are ASCII. Vnode ids are zero-padded to the decimal width of
//! `V-1`, so the per-vnode keys sort in vnode order in an ordered engine
//! and the layout is identical on every host for a given configuration.
//!
//! | Key              | Value                          |
//! |------------------|--------------------------------|
//! | `VNODE_COUNT`    | decimal V                      |
//! | `ALGORITHM`      | hash name                      |
//! | `VERSION`        | schema version                 |
//! | `COMPLETE`       | `1`, written last at creation  |
//! | `/PNODE`         | JSON array of pnode names      |
//! | `/PNODE/%s`      | JSON array of owned vnode ids  |
//! | `/PNODE/%s/%d`   | per-vnode datum (JSON)         |
//! | `/VNODE/%d`      | owning pnode name              |
//! | `VNODE_DATA`     | JSON array of data vnode ids   |

pub const KEY_VNODE_COUNT: &[u8] = b"VNODE_COUNT";
pub const KEY_ALGORITHM: &[u8] = b"ALGORITHM";
pub const KEY_VERSION: &[u8] = b"VERSION";
pub const KEY_COMPLETE: &[u8] = b"COMPLETE";
pub const KEY_PNODE_SET: &[u8] = b"/PNODE";
pub const KEY_VNODE_DATA: &[u8] = b"VNODE_DATA";

/// Decimal width of the largest vnode id.
pub fn pad_width(vnode_count: u32) -> usize {
    let top = vnode_count.saturating_sub(1);
    (top.checked_ilog10().unwrap_or(0) + 1) as usize
}

/// `/VNODE/%d`
pub fn vnode_key(pad: usize, vnode: u32) -> Vec<u8> {
    format!("/VNODE/{:0width$}", vnode, width = pad).into_bytes()
}

/// `/PNODE/%s`
pub fn pnode_key(pnode: &str) -> Vec<u8> {
    format!("/PNODE/{}", pnode).into_bytes()
}

/// `/PNODE/%s/%d`
pub fn pnode_vnode_key(pad: usize, pnode: &str, vnode: u32) -> Vec<u8> {
    format!("/PNODE/{}/{:0width$}", pnode, vnode, width = pad).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_width() {
        assert_eq!(pad_width(1), 1);
        assert_eq!(pad_width(6), 1);
        assert_eq!(pad_width(10), 1);
        assert_eq!(pad_width(11), 2);
        assert_eq!(pad_width(1000), 3);
        assert_eq!(pad_width(1001), 4);
    }

    #[test]
    fn test_key_forms() {
        assert_eq!(vnode_key(1, 4), b"/VNODE/4");
        assert_eq!(vnode_key(3, 4), b"/VNODE/004");
        assert_eq!(pnode_key("tcp://a:2020"), b"/PNODE/tcp://a:2020");
        assert_eq!(
            pnode_vnode_key(3, "tcp://a:2020", 41),
            b"/PNODE/tcp://a:2020/041"
        );
    }

    #[test]
    fn test_padded_keys_sort_in_vnode_order() {
        let pad = pad_width(1000);
        let mut keys: Vec<Vec<u8>> = (0..1000).map(|v| vnode_key(pad, v)).collect();
        let sorted = {
            let mut s = keys.clone();
            s.sort();
            s
        };
        assert_eq!(keys, sorted);
        keys.reverse();
        assert_ne!(keys, sorted);
    }
}
