use std::ops::Range;
use std::sync::Arc;

use solana_client::rpc_request::MAX_MULTIPLE_ACCOUNTS;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::error::{Result, VotingClientError};
use crate::rpc::{AccountFilter, ChainRpc, DataSlice};
use crate::state::{ScannableRecord, SortKey, DISCRIMINATOR_LEN};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 20;

/// A 1-indexed page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Result<Self> {
        if page == 0 {
            return Err(VotingClientError::validation("page numbers start at 1"));
        }
        if per_page == 0 {
            return Err(VotingClientError::validation(
                "per_page must be a positive integer",
            ));
        }
        Ok(Self { page, per_page })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Indices of this page within a listing of `len` items, empty past the end.
    pub fn range(&self, len: usize) -> Range<usize> {
        let per_page = self.per_page as usize;
        let start = (self.page as usize - 1).checked_mul(per_page);
        match start {
            Some(start) if start < len => start..start.saturating_add(per_page).min(len),
            _ => 0..0,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Lists program accounts of one record type, sorted by a numeric field.
pub struct AccountScanner {
    rpc: Arc<dyn ChainRpc>,
    program_id: Pubkey,
}

impl AccountScanner {
    pub fn new(rpc: Arc<dyn ChainRpc>, program_id: Pubkey) -> Self {
        Self { rpc, program_id }
    }

    /// Addresses of every account starting with `discriminator`, optionally restricted
    /// to one session, ordered by the little-endian integer at `sort_key`.
    ///
    /// Only the sort key bytes of each account are transferred. Equal keys are ordered
    /// by address.
    pub async fn scan(
        &self,
        discriminator: [u8; DISCRIMINATOR_LEN],
        session: Option<(usize, u64)>,
        sort_key: SortKey,
    ) -> Result<Vec<Pubkey>> {
        if sort_key.length == 0 || sort_key.length > 8 {
            return Err(VotingClientError::validation(format!(
                "sort key of {} bytes does not fit an integer",
                sort_key.length
            )));
        }

        let mut filters = vec![AccountFilter::Memcmp {
            offset: 0,
            bytes: discriminator.to_vec(),
        }];
        if let Some((offset, session_id)) = session {
            filters.push(AccountFilter::Memcmp {
                offset,
                bytes: session_id.to_le_bytes().to_vec(),
            });
        }
        let slice = DataSlice {
            offset: sort_key.offset,
            length: sort_key.length,
        };

        let accounts = self
            .rpc
            .program_accounts(&self.program_id, &filters, Some(slice))
            .await?;

        let mut keyed = Vec::with_capacity(accounts.len());
        for (address, bytes) in accounts {
            if bytes.len() != sort_key.length {
                warn!(%address, len = bytes.len(), "Skipping account with truncated sort key");
                continue;
            }
            let mut le = [0u8; 8];
            le[..bytes.len()].copy_from_slice(&bytes);
            keyed.push((u64::from_le_bytes(le), address));
        }
        keyed.sort_unstable();

        info!(count = keyed.len(), ?session, "Scanned program accounts");
        Ok(keyed.into_iter().map(|(_, address)| address).collect())
    }

    /// Sorted addresses of every `T` record, restricted to `session_id` when given.
    pub async fn scan_records<T: ScannableRecord>(
        &self,
        session_id: Option<u64>,
    ) -> Result<Vec<Pubkey>> {
        let session = session_id.map(|id| (T::SESSION_ID_OFFSET, id));
        self.scan(T::discriminator(), session, T::SORT_KEY).await
    }

    /// Fetches and decodes the records on one page of `addresses`.
    ///
    /// Accounts closed since the scan are left out of the page.
    pub async fn page<T: ScannableRecord>(
        &self,
        addresses: &[Pubkey],
        pagination: Pagination,
    ) -> Result<Vec<(Pubkey, T)>> {
        let window = &addresses[pagination.range(addresses.len())];
        if window.is_empty() {
            debug!(
                page = pagination.page(),
                total = addresses.len(),
                "Requested page is past the end"
            );
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(window.len());
        // Nodes refuse getMultipleAccounts calls above MAX_MULTIPLE_ACCOUNTS keys.
        for batch in window.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let data = self.rpc.multiple_account_data(batch).await?;
            for (address, data) in batch.iter().zip(data) {
                match data {
                    Some(data) => records.push((*address, T::try_from_account_data(&data)?)),
                    None => warn!(%address, record = T::NAME, "Account vanished since scan"),
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn pages_are_one_indexed_windows() {
        let pagination = Pagination::new(2, 3).unwrap();
        assert_eq!(pagination.range(10), 3..6);
        assert_eq!(Pagination::new(4, 3).unwrap().range(10), 9..10);
        assert_eq!(Pagination::new(5, 3).unwrap().range(10), 0..0);
        assert_eq!(Pagination::default().range(0), 0..0);
        assert_eq!(Pagination::new(u32::MAX, u32::MAX).unwrap().range(10), 0..0);
    }

    #[test]
    fn invalid_pagination_is_rejected() {
        assert_matches!(Pagination::new(0, 10), Err(VotingClientError::Validation(_)));
        assert_matches!(Pagination::new(1, 0), Err(VotingClientError::Validation(_)));
        assert_eq!(Pagination::default(), Pagination::new(1, 20).unwrap());
    }
}
