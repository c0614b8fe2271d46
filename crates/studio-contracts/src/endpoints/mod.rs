mod registry;

pub use registry::{
    endpoint_name, resolve_endpoint_url, EndpointDescriptor, EndpointRegistry, EndpointTransport,
    DEFAULT_API_BASE, DEFAULT_QUEUE_API_BASE,
};
