//! Operations spanning several registries in one transaction

use super::Ctx;
use crate::hub::Registries;
use crate::model::{ChannelDescription, DeviceDescription, ProtocolId};
use crate::name::{Channel, Device, EntityName};
use crate::storage::commit;
use crate::{Error, Result};
use std::sync::Arc;

/// Names inserted during one attempt
#[derive(Default)]
struct Created {
    device: Option<Device>,
    channel: Option<Channel>,
}

/// Create (when the name is nil) or reuse a device and a channel, then join them.
///
/// All writes share one transaction. Notifications go out only after the
/// commit; a failed attempt leaves neither rows nor cache entries behind.
pub fn register_channel_and_device(
    ctx: &Ctx<'_>,
    regs: &mut Registries,
    device: &DeviceDescription,
    channel: &ChannelDescription,
) -> Result<(ProtocolId, Arc<ChannelDescription>)> {
    let tx = ctx.store.transaction().map_err(|e| Error::CantRegister(e.to_string()))?;
    let mut created = Created::default();

    let linked = insert_and_link(ctx, regs, device, channel, &mut created)
        .and_then(|names| commit(tx).map(|_| names).map_err(|e| Error::CantRegister(e.to_string())));

    let (device_name, channel_name) = match linked {
        Ok(names) => names,
        Err(e) => {
            // Rows are gone with the rollback; so must be anything cached from them
            if let Some(name) = created.device {
                regs.device.evict(&name);
            }
            if let Some(name) = created.channel {
                regs.channel.evict(&name);
            }
            tracing::debug!("register_channel_and_device rolled back: {}", e);
            return Err(e);
        }
    };

    if let Some(name) = created.device {
        regs.device.registered(ctx, &name, true);
    }
    if let Some(name) = created.channel {
        regs.channel.registered(ctx, &name, true);
    }
    ctx.notifier.connected(true, device_name, channel_name);
    let channel = regs.channel.updated(ctx, &channel_name)?;
    let device = regs.device.updated(ctx, &device_name)?;

    Ok((device.protocol_id.clone(), channel))
}

fn insert_and_link(
    ctx: &Ctx<'_>,
    regs: &mut Registries,
    device: &DeviceDescription,
    channel: &ChannelDescription,
    created: &mut Created,
) -> Result<(Device, Channel)> {
    let device_name = if device.name.is_nil() {
        let (_, name) = regs.device.insert(ctx.store, device)?;
        created.device = Some(name);
        name
    } else {
        device.name
    };

    let channel_name = if channel.name.is_nil() {
        let (_, name) = regs.channel.insert(ctx.store, channel)?;
        created.channel = Some(name);
        name
    } else {
        channel.name
    };

    regs.device
        .link(ctx.store, &mut regs.channel, &mut regs.protocol, &device_name, &channel_name)?;
    Ok((device_name, channel_name))
}
