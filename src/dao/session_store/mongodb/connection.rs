use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 5;
const PING_INITIAL_DELAY: Duration = Duration::from_millis(250);
const PING_MAX_DELAY: Duration = Duration::from_secs(2);

/// Build a client for `database_name` and wait until the server answers a ping.
///
/// The storage supervisor retries on its own schedule, so this only smooths over a
/// server that is still starting.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delay = PING_INITIAL_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(source) if attempt >= PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                debug!(attempt, error = %err, database = database_name, "MongoDB ping failed");
                sleep(delay).await;
                delay = (delay * 2).min(PING_MAX_DELAY);
            }
        }
    }
}
