//! BSS enumeration.
//!
//! wpa_supplicant exposes scan results one entry at a time through
//! `BSS <index>`. There is no count, so the whole index range up to a fixed
//! bound is walked; indices without an entry answer with something that
//! does not look like a BSS and are skipped.

use tracing::debug;

use crate::connection::ControlConnection;
use crate::error::WpaCtrlError;

/// The command fetching the scan result at `index`.
pub fn bss_command(index: usize) -> String {
    format!("BSS {index}")
}

impl ControlConnection {
    /// Collect every scan result, one string of `key=value` lines per BSS.
    ///
    /// Walks `BSS 0` up to `scan.max_index` and keeps replies containing
    /// `scan.match_substring` (`bssid=` by default). Specific to
    /// wpa_supplicant.
    pub async fn scan_results(&mut self) -> Result<Vec<String>, WpaCtrlError> {
        let scan = self.scan_config().clone();
        self.scan_results_matching(scan.max_index, |reply| {
            reply.contains(&scan.match_substring)
        })
        .await
    }

    /// Like [`scan_results`](Self::scan_results) with a caller-supplied
    /// bound and keep predicate.
    ///
    /// Every index below `limit` is requested; a miss does not end the walk.
    /// The first failed request aborts it.
    pub async fn scan_results_matching<F>(
        &mut self,
        limit: usize,
        mut keep: F,
    ) -> Result<Vec<String>, WpaCtrlError>
    where
        F: FnMut(&str) -> bool,
    {
        let mut results = Vec::new();
        for index in 0..limit {
            let reply = self.request(bss_command(index)).await?;
            let reply = String::from_utf8_lossy(&reply);
            if keep(&reply) {
                results.push(reply.into_owned());
            }
        }
        debug!(found = results.len(), limit, "scan enumeration finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bss_command() {
        assert_eq!(bss_command(0), "BSS 0");
        assert_eq!(bss_command(999), "BSS 999");
    }
}
