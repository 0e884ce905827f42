//! Purpose: Constrained per-operation responses and the abstract outbound response.
//! Exports: `SuccessStatus`, `TypedResponse`, one response type per operation, `OutgoingResponse`.
//! Role: Handlers return these; the dispatcher encodes them with `OutgoingResponse::success`.
//! Invariants: Each response type only offers constructors for the statuses its operation allows.
//! Invariants: Every outgoing body is a JSON object; failures use the two-field envelope.
use crate::core::error::{Error, ErrorEnvelope, ErrorKind};
use crate::json::{self, Mapping};
use crate::model::{
    BindResponseBody, CatalogBody, DeprovisionResponseBody, FetchBindingResponseBody,
    FetchInstanceResponseBody, LastOperationBody, ProvisionResponseBody, UnbindResponseBody,
    UpdateResponseBody,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SuccessStatus {
    Ok,
    Created,
    Accepted,
}

impl SuccessStatus {
    pub fn code(self) -> u16 {
        match self {
            SuccessStatus::Ok => 200,
            SuccessStatus::Created => 201,
            SuccessStatus::Accepted => 202,
        }
    }
}

/// A handler's result for one operation.
pub trait TypedResponse {
    fn status(&self) -> SuccessStatus;

    fn mapping(&self) -> &Mapping;
}

macro_rules! response_type {
    ($(#[$meta:meta])* $name:ident($body:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            status: SuccessStatus,
            body: $body,
        }

        impl $name {
            pub fn body(&self) -> &$body {
                &self.body
            }
        }

        impl TypedResponse for $name {
            fn status(&self) -> SuccessStatus {
                self.status
            }

            fn mapping(&self) -> &Mapping {
                &self.body
            }
        }
    };
}

response_type!(CatalogResponse(CatalogBody));
response_type!(ProvisionResponse(ProvisionResponseBody));
response_type!(FetchInstanceResponse(FetchInstanceResponseBody));
response_type!(UpdateInstanceResponse(UpdateResponseBody));
response_type!(DeprovisionResponse(DeprovisionResponseBody));
response_type!(
    /// Answer to an instance last-operation poll.
    InstanceLastOperationResponse(LastOperationBody)
);
response_type!(BindResponse(BindResponseBody));
response_type!(FetchBindingResponse(FetchBindingResponseBody));
response_type!(UnbindResponse(UnbindResponseBody));
response_type!(
    /// Answer to a binding last-operation poll.
    BindingLastOperationResponse(LastOperationBody)
);

impl CatalogResponse {
    pub fn new(body: CatalogBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }
}

impl ProvisionResponse {
    /// The instance already exists with identical attributes.
    pub fn ok(body: ProvisionResponseBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }

    pub fn created(body: ProvisionResponseBody) -> Self {
        Self {
            status: SuccessStatus::Created,
            body,
        }
    }

    pub fn accepted(body: ProvisionResponseBody) -> Self {
        Self {
            status: SuccessStatus::Accepted,
            body,
        }
    }
}

impl FetchInstanceResponse {
    pub fn new(body: FetchInstanceResponseBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }
}

impl UpdateInstanceResponse {
    pub fn ok(body: UpdateResponseBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }

    pub fn accepted(body: UpdateResponseBody) -> Self {
        Self {
            status: SuccessStatus::Accepted,
            body,
        }
    }
}

impl DeprovisionResponse {
    pub fn ok() -> Self {
        Self {
            status: SuccessStatus::Ok,
            body: DeprovisionResponseBody::new(),
        }
    }

    pub fn accepted(body: DeprovisionResponseBody) -> Self {
        Self {
            status: SuccessStatus::Accepted,
            body,
        }
    }
}

impl InstanceLastOperationResponse {
    pub fn new(body: LastOperationBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }
}

impl BindResponse {
    /// The binding already exists with identical attributes.
    pub fn ok(body: BindResponseBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }

    pub fn created(body: BindResponseBody) -> Self {
        Self {
            status: SuccessStatus::Created,
            body,
        }
    }

    pub fn accepted(body: BindResponseBody) -> Self {
        Self {
            status: SuccessStatus::Accepted,
            body,
        }
    }
}

impl FetchBindingResponse {
    pub fn new(body: FetchBindingResponseBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }
}

impl UnbindResponse {
    pub fn ok() -> Self {
        Self {
            status: SuccessStatus::Ok,
            body: UnbindResponseBody::new(),
        }
    }

    pub fn accepted(body: UnbindResponseBody) -> Self {
        Self {
            status: SuccessStatus::Accepted,
            body,
        }
    }
}

impl BindingLastOperationResponse {
    pub fn new(body: LastOperationBody) -> Self {
        Self {
            status: SuccessStatus::Ok,
            body,
        }
    }
}

/// Status plus encoded JSON body, ready for any transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutgoingResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl OutgoingResponse {
    /// Encodes a handler's response.
    pub fn success(response: &dyn TypedResponse) -> Result<Self, Error> {
        let mut body = Vec::new();
        json::write_mapping(&mut body, response.mapping()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode response body")
                .with_source(err)
        })?;
        Ok(Self {
            status: response.status().code(),
            body,
        })
    }

    pub fn from_envelope(envelope: &ErrorEnvelope) -> Self {
        let mut body = Mapping::generic();
        body.insert("error", envelope.error.as_str());
        body.insert("description", envelope.description.as_str());
        Self {
            status: envelope.status,
            body: json::mapping_to_string(&body).into_bytes(),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::from_envelope(&ErrorEnvelope::from_error(err))
    }

    pub fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
