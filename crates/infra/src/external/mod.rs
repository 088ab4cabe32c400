pub mod forecast;
pub mod http;
pub mod session;

pub use forecast::{DemandPoint, DemandSeries, ForecastClient, Recommendation, RecommendationKind};
pub use http::{HttpTransport, StaticCredentials};
pub use session::{AuthenticatedTransport, CredentialSource, Method, OutboundRequest, OutboundResponse, Transport, TransportError};
