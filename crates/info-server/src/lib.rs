//! HTTPS host for the Information Service.
//!
//! Exposes the document handler over a small REST surface:
//!
//! | Verb     | Path                          | Operation            |
//! |----------|-------------------------------|----------------------|
//! | `GET`    | `/info/{key}`                 | read document        |
//! | `GET`    | `/info/{key}?pairingcode=C`   | claim pairing entry  |
//! | `PUT`    | `/info/{key}`                 | merge patch          |
//! | `POST`   | `/info/{key}`                 | replace document     |
//! | `DELETE` | `/info/{key}?path=NAME`       | delete named entry   |
//! | `DELETE` | `/info/{key}/{name}`          | delete named entry   |
//! | `POST`   | `/pairing`                    | request pairing code |
//! | `GET`    | `/health`, `/generate`, `/`   | service utilities    |

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{PairingConfig, ServiceConfig, TlsConfig};
pub use error::{ApiError, ServerError, ServerResult};
pub use handler::AppState;
pub use server::{build_runtime, certificate_chain_pem, InfoServer};
