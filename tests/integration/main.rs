//! Integration tests: feed snapshot → scan → filter → execute → record.

mod mock_exchange;
mod pipeline;
