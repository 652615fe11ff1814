//! Web Module
//!
//! JSON API and status page over a [`GridManager`](crate::grid::GridManager).
//!
//! | Route                      | Operation                    |
//! |----------------------------|------------------------------|
//! | `GET /`                    | status page                  |
//! | `GET /api/symbols`         | perpetual symbols            |
//! | `POST /api/grids/preview`  | plan without placing         |
//! | `POST /api/grids`          | place and track a grid       |
//! | `GET /api/grids`           | tracked grids                |
//! | `DELETE /api/grids/:symbol`| cancel a grid (best effort)  |

mod dashboard;
mod server;

pub use dashboard::render_status_page;
pub use server::{router, serve, ApiError, AppState, GridRequestBody};
