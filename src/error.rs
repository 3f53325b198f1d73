use thiserror::Error;

/// Malformed or infeasible input. Halts the run before any solving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no orders to optimize")]
    NoOrders,

    #[error("fleet has no vehicles")]
    EmptyFleet,

    #[error("duplicate order id {0}")]
    DuplicateOrder(String),

    #[error("duplicate vehicle id {0}")]
    DuplicateVehicle(String),

    #[error("order {id} has non-positive demand {demand}")]
    NonPositiveDemand { id: String, demand: f64 },

    #[error("vehicle {id} has non-positive capacity {capacity}")]
    NonPositiveCapacity { id: String, capacity: f64 },

    #[error("order {0} has neither an address nor a coordinate")]
    MissingAddress(String),

    #[error("order {0} has an out-of-range coordinate")]
    InvalidCoordinate(String),

    #[error("depot coordinate is out of range")]
    InvalidDepot,

    #[error("order {0} has a time window that ends before it starts")]
    InvalidTimeWindow(String),

    #[error("working hours end before they start")]
    InvalidWorkingHours,

    #[error("address is empty")]
    EmptyAddress,

    #[error("total demand exceeds total vehicle capacity ({demand} > {capacity})")]
    CapacityExceeded { demand: f64, capacity: f64 },
}

/// Failure reported by a geocoding provider. Always soft.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no match for address")]
    NotFound,

    #[error("coordinate {lat},{lng} is outside the service region")]
    OutOfBounds { lat: f64, lng: f64 },

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("optimization was cancelled")]
    Cancelled,
}
