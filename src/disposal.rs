// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{ConstructorDescriptor, MemberDescriptor, MemberKind, MethodDescriptor};
use crate::error::DisposalError;
use crate::options::Options;
use crate::value::Value;

/// Which configuration entry governs the values a node hands out.
#[derive(Debug, Clone)]
pub enum Disposal {
    Never,
    Constructed(ConstructorDescriptor),
    Returned(MethodDescriptor),
    Property(MemberDescriptor),
}

impl Disposal {
    pub fn for_member(member: &MemberDescriptor) -> Self {
        match member.kind {
            MemberKind::Property => Disposal::Property(member.clone()),
            MemberKind::Field => Disposal::Never,
        }
    }

    pub fn applies(&self, options: &Options) -> bool {
        match self {
            Disposal::Never => false,
            Disposal::Constructed(c) => options.is_constructed_type_disposed(c),
            Disposal::Returned(m) => options.is_method_return_value_disposed(m),
            Disposal::Property(p) => options.is_property_value_disposed(p),
        }
    }

    /// Dispose `outgoing` when it leaves the node. Nothing happens when the
    /// policy does not apply, when it is not a host object or when the
    /// `incoming` value is the very same instance. Returns whether a disposal
    /// ran.
    pub fn release(
        &self,
        options: &Options,
        outgoing: &Value,
        incoming: Option<&Value>,
    ) -> Result<bool, DisposalError> {
        let Value::Host(host) = outgoing else {
            return Ok(false);
        };
        if incoming.and_then(Value::host_id) == Some(host.id()) || !self.applies(options) {
            return Ok(false);
        }
        host.dispose().map_err(|source| DisposalError {
            value: outgoing.clone(),
            source,
        })?;
        Ok(true)
    }
}
