// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::{self, Display, Formatter};

/// Resources consumed, or allowed to be consumed, by a contract call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    pub cpu: i64,
    pub memory: i64,
    pub disk: i64,
    pub fee: i64,
}

/// Limits for calls that are trusted not to need metering.
pub const MAX_LIMITS: Limits = Limits {
    cpu: 0xFFFF_FFFF,
    memory: 0xFFFF_FFFF,
    disk: 0xFFFF_FFFF,
    fee: 0xFFFF_FFFF,
};

impl Limits {
    pub fn add(&mut self, other: Limits) -> &mut Self {
        self.cpu += other.cpu;
        self.memory += other.memory;
        self.disk += other.disk;
        self.fee += other.fee;
        self
    }

    pub fn sub(&mut self, other: Limits) -> &mut Self {
        self.cpu -= other.cpu;
        self.memory -= other.memory;
        self.disk -= other.disk;
        self.fee -= other.fee;
        self
    }

    /// Returns true if any dimension is strictly greater than the
    /// corresponding dimension of `cap`.
    pub fn exceed(&self, cap: &Limits) -> bool {
        self.cpu > cap.cpu
            || self.memory > cap.memory
            || self.disk > cap.disk
            || self.fee > cap.fee
    }

    /// The gas these resources cost at the given `price`.
    pub fn total_gas(&self, price: &GasPrice) -> i64 {
        roundup(self.cpu, price.cpu_rate)
            + roundup(self.memory, price.mem_rate)
            + roundup(self.disk, price.disk_rate)
            + roundup(self.fee, price.xfee_rate)
    }

    /// Builds limits from per-resource entries. Later entries for the same
    /// resource win.
    pub fn from_resource_limits<'a, I>(limits: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceLimit>,
    {
        let mut l = Limits::default();
        for limit in limits {
            match limit.resource_type {
                ResourceType::Cpu => l.cpu = limit.limit,
                ResourceType::Memory => l.memory = limit.limit,
                ResourceType::Disk => l.disk = limit.limit,
                ResourceType::XFee => l.fee = limit.limit,
            }
        }
        l
    }

    pub fn to_resource_limits(&self) -> Vec<ResourceLimit> {
        vec![
            ResourceLimit::new(ResourceType::Cpu, self.cpu),
            ResourceLimit::new(ResourceType::Memory, self.memory),
            ResourceLimit::new(ResourceType::Disk, self.disk),
            ResourceLimit::new(ResourceType::XFee, self.fee),
        ]
    }
}

impl Display for Limits {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "cpu:{} memory:{} disk:{} fee:{}",
            self.cpu, self.memory, self.disk, self.fee
        )
    }
}

/// Units of each resource bought by one unit of gas.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GasPrice {
    pub cpu_rate: i64,
    pub mem_rate: i64,
    pub disk_rate: i64,
    pub xfee_rate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Cpu,
    Memory,
    Disk,
    XFee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLimit {
    pub resource_type: ResourceType,
    pub limit: i64,
}

impl ResourceLimit {
    pub fn new(resource_type: ResourceType, limit: i64) -> Self {
        Self {
            resource_type,
            limit,
        }
    }
}

// ceil(n / scale), and zero for a zero scale.
fn roundup(n: i64, scale: i64) -> i64 {
    if scale == 0 {
        return 0;
    }
    (n + scale - 1) / scale
}
