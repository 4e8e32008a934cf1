//! Content resolver API.
//!
//! Two methods, each on its own channel:
//! - `create(CreateMessage)`: announce a provider authority
//! - `getType(GetTypeMessage) -> Option<String>`: MIME type of a resource
//!
//! Messages travel as string-keyed maps.

use std::sync::Arc;

use cpwire_codec::{Value, ValueMap};

use crate::api::{Api, MethodFn};
use crate::envelope::{take_arguments, ApiError};
use crate::error::{Result, RpcError};
use crate::messenger::BinaryMessenger;

pub const API_NAME: &str = "ContentResolverApi";
pub const CREATE: &str = "create";
pub const GET_TYPE: &str = "getType";

/// Announces the provider for `authority`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMessage {
    pub authority: Option<String>,
}

impl CreateMessage {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::with_capacity(1);
        map.insert("authority", self.authority.clone());
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> std::result::Result<Self, ApiError> {
        let map = message_map(value, "CreateMessage")?;
        Ok(Self {
            authority: string_field(map, "authority")?,
        })
    }
}

/// Asks for the MIME type of `uri` at provider `authority`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetTypeMessage {
    pub authority: Option<String>,
    pub uri: Option<String>,
}

impl GetTypeMessage {
    pub fn new(authority: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
            uri: Some(uri.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::with_capacity(2);
        map.insert("authority", self.authority.clone());
        map.insert("uri", self.uri.clone());
        Value::Map(map)
    }

    pub fn from_value(value: &Value) -> std::result::Result<Self, ApiError> {
        let map = message_map(value, "GetTypeMessage")?;
        Ok(Self {
            authority: string_field(map, "authority")?,
            uri: string_field(map, "uri")?,
        })
    }
}

fn message_map<'a>(value: &'a Value, what: &str) -> std::result::Result<&'a ValueMap, ApiError> {
    value
        .as_map()
        .ok_or_else(|| ApiError::argument(format!("{what} must be a map, got {}", value.kind())))
}

fn string_field(map: &ValueMap, key: &str) -> std::result::Result<Option<String>, ApiError> {
    match map.get_str(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ApiError::argument(format!(
            "{key} must be a string, got {}",
            other.kind()
        ))),
    }
}

/// Host side of the content resolver API.
pub trait ContentResolverApi: Send + Sync {
    fn create(&self, message: CreateMessage) -> std::result::Result<(), ApiError>;

    fn get_type(&self, message: GetTypeMessage) -> std::result::Result<Option<String>, ApiError>;
}

/// Bind `api` on `messenger`, or unbind both methods with `None`.
pub fn setup(messenger: Arc<dyn BinaryMessenger>, api: Option<Arc<dyn ContentResolverApi>>) {
    let channels = Api::new(messenger, API_NAME);
    let Some(api) = api else {
        channels.bind(CREATE, None);
        channels.bind(GET_TYPE, None);
        return;
    };

    let target = Arc::clone(&api);
    let create: Arc<MethodFn> = Arc::new(move |args: Vec<Value>| {
        let [message] = take_arguments(args)?;
        if message.is_null() {
            return Err(ApiError::null_argument("message"));
        }
        target.create(CreateMessage::from_value(&message)?)?;
        Ok(Value::Null)
    });
    channels.bind(CREATE, Some(create));

    let get_type: Arc<MethodFn> = Arc::new(move |args: Vec<Value>| {
        let [message] = take_arguments(args)?;
        if message.is_null() {
            return Err(ApiError::null_argument("message"));
        }
        Ok(Value::from(api.get_type(GetTypeMessage::from_value(&message)?)?))
    });
    channels.bind(GET_TYPE, Some(get_type));
}

/// Calling side of the content resolver API.
#[derive(Debug, Clone)]
pub struct ContentResolverClient {
    api: Api,
}

impl ContentResolverClient {
    pub fn new(messenger: Arc<dyn BinaryMessenger>) -> Self {
        Self {
            api: Api::new(messenger, API_NAME),
        }
    }

    pub fn create(&self, message: &CreateMessage) -> Result<()> {
        self.api.call(CREATE, vec![message.to_value()])?;
        Ok(())
    }

    pub fn get_type(&self, message: &GetTypeMessage) -> Result<Option<String>> {
        match self.api.call(GET_TYPE, vec![message.to_value()])? {
            Value::Null => Ok(None),
            Value::String(mime) => Ok(Some(mime)),
            other => Err(RpcError::MalformedReply(format!(
                "getType result is a {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::messenger::LocalMessenger;

    #[derive(Default)]
    struct Provider {
        created: Mutex<Vec<String>>,
    }

    impl ContentResolverApi for Provider {
        fn create(&self, message: CreateMessage) -> std::result::Result<(), ApiError> {
            let authority = message
                .authority
                .ok_or_else(|| ApiError::null_argument("authority"))?;
            self.created.lock().unwrap().push(authority);
            Ok(())
        }

        fn get_type(
            &self,
            message: GetTypeMessage,
        ) -> std::result::Result<Option<String>, ApiError> {
            Ok(match message.uri.as_deref() {
                Some(uri) if uri.ends_with(".mp3") => Some("audio/mpeg".into()),
                Some(_) => None,
                None => return Err(ApiError::illegal_state("no uri")),
            })
        }
    }

    fn bound() -> (Arc<Provider>, ContentResolverClient, Arc<dyn BinaryMessenger>) {
        let messenger: Arc<dyn BinaryMessenger> = Arc::new(LocalMessenger::new().unwrap());
        let provider = Arc::new(Provider::default());
        setup(Arc::clone(&messenger), Some(provider.clone()));
        (provider, ContentResolverClient::new(Arc::clone(&messenger)), messenger)
    }

    #[test]
    fn message_maps_round_trip() {
        let message = GetTypeMessage::new("media", "content://media/1");
        assert_eq!(GetTypeMessage::from_value(&message.to_value()).unwrap(), message);
        let empty = CreateMessage::default();
        assert_eq!(CreateMessage::from_value(&empty.to_value()).unwrap(), empty);
    }

    #[test]
    fn create_reaches_provider() {
        let (provider, client, _) = bound();
        client.create(&CreateMessage::new("com.example.media")).unwrap();
        assert_eq!(*provider.created.lock().unwrap(), vec!["com.example.media"]);
    }

    #[test]
    fn get_type_results() {
        let (_, client, _) = bound();
        assert_eq!(
            client
                .get_type(&GetTypeMessage::new("a", "content://a/song.mp3"))
                .unwrap()
                .as_deref(),
            Some("audio/mpeg")
        );
        assert_eq!(
            client
                .get_type(&GetTypeMessage::new("a", "content://a/x"))
                .unwrap(),
            None
        );
        let err = client.get_type(&GetTypeMessage::default()).unwrap_err();
        assert!(matches!(err, RpcError::Remote { ref code, .. } if code == "IllegalState"));
    }

    #[test]
    fn null_message_is_rejected() {
        let (_, _, messenger) = bound();
        let api = Api::new(messenger, API_NAME);
        let err = api.call(CREATE, vec![Value::Null]).unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote { ref code, ref message, .. }
                if code == "ArgumentError" && message.contains("message")
        ));
    }

    #[test]
    fn teardown_unbinds_both_channels() {
        let (_, client, messenger) = bound();
        setup(messenger, None);
        assert!(matches!(
            client.create(&CreateMessage::new("x")),
            Err(RpcError::NoReply(_))
        ));
        assert!(matches!(
            client.get_type(&GetTypeMessage::new("x", "y")),
            Err(RpcError::NoReply(_))
        ));
    }
}
