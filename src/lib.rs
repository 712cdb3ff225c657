// SPDX-License-Identifier: Apache-2.0

//! Core library for the Hive runtime.
//! Provides the foundational components for building distributed, actor-based
//! backend services: the actor core, location-transparent message routing and
//! the cluster/discovery interface boundary.

pub use actor::{
    code, ActorContext, ActorHandler, ActorPath, ActorRef, ActorState,
    ActorSystem, Cluster, ClusterReply, DailySchedule, Discovery, Dispatch,
    Error, EventData, HourlySchedule, IntervalSchedule, Message, NodeInfo,
    Payload, RemotePacket, Response, ResponsePacket, Scheduler, Serializer,
    Settings, SystemEvent, SystemRef, SystemRunner, TimerId,
};
