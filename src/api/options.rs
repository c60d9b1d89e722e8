use std::convert::TryFrom;
use tokio::time::Duration;

/// Protocol timing knobs. Everything is optional; the defaults suit a small
/// LAN cluster, and tests shrink them for fast convergence.
#[derive(Clone, Default)]
pub struct BullyOptions {
    /// How long an election round waits for an OK from a higher node.
    pub election_timeout: Option<Duration>,
    /// After an OK, how long to wait for the promised COORDINATOR
    /// announcement before re-electing.
    pub announcement_timeout: Option<Duration>,
    /// How long the health monitor waits for a PONG each cycle.
    pub ping_timeout: Option<Duration>,
}

pub(super) struct BullyOptionsValidated {
    pub election_timeout: Duration,
    pub announcement_timeout: Duration,
    pub ping_timeout: Duration,
}

impl BullyOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.election_timeout.is_zero() {
            return Err("Election timeout must be non-zero");
        }
        if self.announcement_timeout.is_zero() {
            return Err("Announcement timeout must be non-zero");
        }
        if self.ping_timeout.is_zero() {
            return Err("Ping timeout must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<BullyOptions> for BullyOptionsValidated {
    type Error = &'static str;

    fn try_from(options: BullyOptions) -> Result<Self, Self::Error> {
        let values = BullyOptionsValidated {
            election_timeout: options.election_timeout.unwrap_or(Duration::from_secs(3)),
            announcement_timeout: options.announcement_timeout.unwrap_or(Duration::from_secs(3)),
            ping_timeout: options.ping_timeout.unwrap_or(Duration::from_secs(4)),
        };

        values.validate()?;
        Ok(values)
    }
}
