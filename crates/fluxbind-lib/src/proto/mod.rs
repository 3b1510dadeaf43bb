//! Protobuf messages spoken with the container runtime
//!
//! The NRI v1alpha1 API subset used by the plugin and the ttrpc envelope
//! carrying it. Only the fields the plugin reads or writes are declared;
//! prost skips unknown fields when decoding, so newer runtimes stay compatible.

pub mod nri {
    pub mod v1alpha1 {
        use prost::Message;
        use serde::Serialize;
        use std::collections::HashMap;

        /// Fully qualified name of the service the plugin serves.
        pub const PLUGIN_SERVICE: &str = "nri.pkg.api.v1alpha1.Plugin";
        /// Fully qualified name of the service the runtime serves.
        pub const RUNTIME_SERVICE: &str = "nri.pkg.api.v1alpha1.Runtime";

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct Empty {}

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct RegisterPluginRequest {
            #[prost(string, tag = "1")]
            pub plugin_name: String,
            #[prost(string, tag = "2")]
            pub plugin_idx: String,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct ConfigureRequest {
            #[prost(string, tag = "1")]
            pub config: String,
            #[prost(string, tag = "2")]
            pub runtime_name: String,
            #[prost(string, tag = "3")]
            pub runtime_version: String,
            #[prost(int64, tag = "4")]
            pub registration_timeout: i64,
            #[prost(int64, tag = "5")]
            pub request_timeout: i64,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct ConfigureResponse {
            #[prost(int32, tag = "2")]
            pub events: i32,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct SynchronizeRequest {
            #[prost(message, repeated, tag = "1")]
            pub pods: Vec<PodSandbox>,
            #[prost(message, repeated, tag = "2")]
            pub containers: Vec<Container>,
            #[prost(bool, tag = "3")]
            pub more: bool,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct SynchronizeResponse {
            #[prost(message, repeated, tag = "1")]
            pub update: Vec<ContainerUpdate>,
            #[prost(bool, tag = "2")]
            pub more: bool,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct CreateContainerRequest {
            #[prost(message, optional, tag = "1")]
            pub pod: Option<PodSandbox>,
            #[prost(message, optional, tag = "2")]
            pub container: Option<Container>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct CreateContainerResponse {
            #[prost(message, optional, tag = "1")]
            pub adjust: Option<ContainerAdjustment>,
            #[prost(message, repeated, tag = "2")]
            pub update: Vec<ContainerUpdate>,
            #[prost(message, repeated, tag = "3")]
            pub evict: Vec<ContainerEviction>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct UpdateContainerRequest {
            #[prost(message, optional, tag = "1")]
            pub pod: Option<PodSandbox>,
            #[prost(message, optional, tag = "2")]
            pub container: Option<Container>,
            #[prost(message, optional, tag = "3")]
            pub linux_resources: Option<LinuxResources>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct UpdateContainerResponse {
            #[prost(message, repeated, tag = "1")]
            pub update: Vec<ContainerUpdate>,
            #[prost(message, repeated, tag = "2")]
            pub evict: Vec<ContainerEviction>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct StopContainerRequest {
            #[prost(message, optional, tag = "1")]
            pub pod: Option<PodSandbox>,
            #[prost(message, optional, tag = "2")]
            pub container: Option<Container>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct StopContainerResponse {
            #[prost(message, repeated, tag = "1")]
            pub update: Vec<ContainerUpdate>,
        }

        /// Pod and container lifecycle notification without a reply payload.
        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct StateChangeEvent {
            #[prost(enumeration = "Event", tag = "1")]
            pub event: i32,
            #[prost(message, optional, tag = "2")]
            pub pod: Option<PodSandbox>,
            #[prost(message, optional, tag = "3")]
            pub container: Option<Container>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct PodSandbox {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub name: String,
            #[prost(string, tag = "3")]
            pub uid: String,
            #[prost(string, tag = "4")]
            pub namespace: String,
            #[prost(map = "string, string", tag = "5")]
            pub labels: HashMap<String, String>,
            #[prost(map = "string, string", tag = "6")]
            pub annotations: HashMap<String, String>,
            #[prost(string, tag = "7")]
            pub runtime_handler: String,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct Container {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub pod_sandbox_id: String,
            #[prost(string, tag = "3")]
            pub name: String,
            #[prost(int32, tag = "4")]
            pub state: i32,
            #[prost(map = "string, string", tag = "5")]
            pub labels: HashMap<String, String>,
            #[prost(map = "string, string", tag = "6")]
            pub annotations: HashMap<String, String>,
            #[prost(string, repeated, tag = "7")]
            pub args: Vec<String>,
            /// `NAME=VALUE` assignments in declaration order.
            #[prost(string, repeated, tag = "8")]
            pub env: Vec<String>,
        }

        /// Changes a plugin requests for a container being created.
        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct ContainerAdjustment {
            #[prost(map = "string, string", tag = "2")]
            #[serde(skip_serializing_if = "HashMap::is_empty")]
            pub annotations: HashMap<String, String>,
            #[prost(message, optional, tag = "6")]
            #[serde(skip_serializing_if = "Option::is_none")]
            pub linux: Option<LinuxContainerAdjustment>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct LinuxContainerAdjustment {
            #[prost(message, optional, tag = "2")]
            #[serde(skip_serializing_if = "Option::is_none")]
            pub resources: Option<LinuxResources>,
            #[prost(string, tag = "3")]
            #[serde(skip_serializing_if = "String::is_empty")]
            pub cgroups_path: String,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct LinuxResources {
            #[prost(message, optional, tag = "2")]
            #[serde(skip_serializing_if = "Option::is_none")]
            pub cpu: Option<LinuxCpu>,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct LinuxCpu {
            /// Allowed CPUs in cgroup list syntax.
            #[prost(string, tag = "6")]
            #[serde(skip_serializing_if = "String::is_empty")]
            pub cpus: String,
            #[prost(string, tag = "7")]
            #[serde(skip_serializing_if = "String::is_empty")]
            pub mems: String,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct ContainerUpdate {
            #[prost(string, tag = "1")]
            pub container_id: String,
            #[prost(bool, tag = "3")]
            pub ignore_failure: bool,
        }

        #[derive(Clone, PartialEq, Message, Serialize)]
        pub struct ContainerEviction {
            #[prost(string, tag = "1")]
            pub container_id: String,
            #[prost(string, tag = "2")]
            pub reason: String,
        }

        /// Runtime events a plugin can subscribe to.
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize,
        )]
        #[repr(i32)]
        pub enum Event {
            Unknown = 0,
            RunPodSandbox = 1,
            StopPodSandbox = 2,
            RemovePodSandbox = 3,
            CreateContainer = 4,
            PostCreateContainer = 5,
            StartContainer = 6,
            PostStartContainer = 7,
            UpdateContainer = 8,
            PostUpdateContainer = 9,
            StopContainer = 10,
            RemoveContainer = 11,
        }

        impl Event {
            /// Subscription bit of this event, zero for `Unknown`.
            pub fn mask(self) -> i32 {
                match self {
                    Event::Unknown => 0,
                    event => 1 << (event as i32 - 1),
                }
            }
        }

        /// Set of subscribed events as carried in `ConfigureResponse.events`.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct EventMask(i32);

        impl EventMask {
            pub fn from_events(events: &[Event]) -> Self {
                Self(events.iter().fold(0, |mask, event| mask | event.mask()))
            }

            pub fn contains(&self, event: Event) -> bool {
                event != Event::Unknown && self.0 & event.mask() != 0
            }

            pub fn bits(&self) -> i32 {
                self.0
            }
        }
    }
}

/// Envelope messages of the ttrpc protocol.
pub mod ttrpc {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Request {
        #[prost(string, tag = "1")]
        pub service: String,
        #[prost(string, tag = "2")]
        pub method: String,
        #[prost(bytes = "vec", tag = "3")]
        pub payload: Vec<u8>,
        #[prost(int64, tag = "4")]
        pub timeout_nano: i64,
        #[prost(message, repeated, tag = "5")]
        pub metadata: Vec<KeyValue>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct KeyValue {
        #[prost(string, tag = "1")]
        pub key: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Response {
        #[prost(message, optional, tag = "1")]
        pub status: Option<Status>,
        #[prost(bytes = "vec", tag = "2")]
        pub payload: Vec<u8>,
    }

    /// gRPC-style status; code 0 is success.
    #[derive(Clone, PartialEq, Message)]
    pub struct Status {
        #[prost(int32, tag = "1")]
        pub code: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }

    pub mod code {
        pub const OK: i32 = 0;
        pub const INVALID_ARGUMENT: i32 = 3;
        pub const UNIMPLEMENTED: i32 = 12;
        pub const INTERNAL: i32 = 13;
    }
}

pub use nri::v1alpha1::*;
