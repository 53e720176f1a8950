mod comments;
mod dto;
mod moderation;
mod publish;
mod rate_limit;
mod response;
mod router;
mod skills;
mod stars;
mod tokens;
mod validation;

pub use rate_limit::{RateLimiter, RequestClass, client_ip};
pub use response::{ApiError, ApiResponse, PaginatedResponse};
pub use router::{AppState, create_router};
