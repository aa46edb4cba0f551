//! Path templates of the Moov API. `%s` marks a positional path parameter.

pub const PING: &str = "/ping";

pub const OAUTH2_TOKEN: &str = "/oauth2/token";
pub const OAUTH2_REVOKE: &str = "/oauth2/revoke";

pub const TRANSFER_OPTIONS: &str = "/transfer-options";

pub const TRANSFERS: &str = "/transfers";
pub const TRANSFER: &str = "/transfers/%s";

pub const REVERSALS: &str = "/transfers/%s/reversals";

pub const REFUNDS: &str = "/transfers/%s/refunds";
pub const REFUND: &str = "/transfers/%s/refunds/%s";
