//! Kernel dispatch
//!
//! Encodes every declared parameter from its argument, binds memory through
//! [`KernelArgumentBinder`], launches the kernel and hands the device leases
//! back once the launch has been queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::domain::{ImageDims, KernelHandle, KernelParam, ParamKind, QueueId, ScalarValue};
use crate::error::{DriverContext, MemoryError};
use crate::ports::{ClDriver, DriverArg};
use crate::service::allocation::{AllocationContext, DeviceLease, MemoryAllocation};
use crate::service::binder::{KernelArgumentBinder, SlotBinding};

/// Value supplied for one kernel parameter
#[derive(Clone, Copy, Debug)]
pub enum KernelArg<'a> {
    Value(ScalarValue),
    Buffer(&'a MemoryAllocation),
    Image(&'a MemoryAllocation, Option<ImageDims>),
}

/// Arguments keyed by parameter name
#[derive(Debug, Default)]
pub struct KernelArgs<'a> {
    args: HashMap<String, KernelArg<'a>>,
}

impl<'a> KernelArgs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, arg: KernelArg<'a>) -> Self {
        self.args.insert(name.into(), arg);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, arg: KernelArg<'a>) {
        self.args.insert(name.into(), arg);
    }

    pub fn get(&self, name: &str) -> Option<&KernelArg<'a>> {
        self.args.get(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Queue to launch on; the configured default when unset
    pub queue: Option<QueueId>,
    pub global_work: Vec<usize>,
    pub local_work: Option<Vec<usize>>,
    /// Block until the queue has drained before returning
    pub wait: bool,
}

impl RunOptions {
    pub fn new(global_work: Vec<usize>) -> Self {
        Self {
            queue: None,
            global_work,
            local_work: None,
            wait: true,
        }
    }

    pub fn on_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn local_work(mut self, local: Vec<usize>) -> Self {
        self.local_work = Some(local);
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }
}

/// Wall clock split of one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunTimings {
    /// Binding arguments, including any map, unmap and copy work
    pub data_to_kernel: Duration,
    /// Launch, plus the wait when one was requested
    pub kernel_exec: Duration,
    pub total: Duration,
}

pub struct KernelDispatcher {
    driver: Arc<dyn ClDriver>,
    context: AllocationContext,
}

impl KernelDispatcher {
    pub fn new(context: &AllocationContext) -> Self {
        Self {
            driver: Arc::clone(context.driver()),
            context: context.clone(),
        }
    }

    /// Bind `args` to the slots described by `params` and launch `kernel`
    pub fn run(
        &self,
        kernel: KernelHandle,
        params: &[KernelParam],
        args: &KernelArgs<'_>,
        options: &RunOptions,
    ) -> Result<RunTimings, MemoryError> {
        let start = Instant::now();
        let queue = options.queue.unwrap_or(self.context.config().default_queue);
        self.context.config().check_queue(queue)?;
        if options.global_work.is_empty() || options.global_work.len() > 3 {
            return Err(MemoryError::InvalidRequest(format!(
                "global work size must have 1 to 3 dimensions, got {}",
                options.global_work.len()
            )));
        }

        let binder = KernelArgumentBinder::new(kernel).on_queue(queue);
        let mut leases: Vec<DeviceLease<'_>> = Vec::new();

        for (index, param) in params.iter().enumerate() {
            let slot = u32::try_from(index)
                .map_err(|_| MemoryError::InvalidKernelArgument("too many parameters".into()))?;
            let arg = args.get(&param.name).ok_or_else(|| {
                MemoryError::InvalidKernelArgument(format!("missing argument '{}'", param.name))
            })?;

            match (param.kind()?, *arg) {
                (ParamKind::Scalar(expected), KernelArg::Value(value)) => {
                    if value.scalar_type() != expected {
                        return Err(MemoryError::InvalidKernelArgument(format!(
                            "'{}' expects {}, got {}",
                            param.name,
                            expected,
                            value.scalar_type()
                        )));
                    }
                    self.driver
                        .set_kernel_arg(kernel, slot, DriverArg::Scalar(value))
                        .context("set scalar kernel argument")?;
                }
                (ParamKind::Buffer, KernelArg::Buffer(allocation) | KernelArg::Image(allocation, _)) => {
                    let binding = SlotBinding::buffer(slot, param.access);
                    bind_reusing(&binder, &mut leases, allocation, &binding)?;
                }
                (ParamKind::Image(_), KernelArg::Image(allocation, dims)) => {
                    let binding = SlotBinding::image(slot, param.access, dims);
                    bind_reusing(&binder, &mut leases, allocation, &binding)?;
                }
                (ParamKind::Image(_), KernelArg::Buffer(allocation)) => {
                    let binding = SlotBinding::image(slot, param.access, allocation.image_dims());
                    bind_reusing(&binder, &mut leases, allocation, &binding)?;
                }
                (kind, _) => {
                    return Err(MemoryError::InvalidKernelArgument(format!(
                        "'{}' declared as {} ({:?}) cannot take this argument",
                        param.name, param.type_name, kind
                    )));
                }
            }
        }
        let data_to_kernel = start.elapsed();

        let exec_start = Instant::now();
        self.driver
            .enqueue_kernel(
                queue,
                kernel,
                &options.global_work,
                options.local_work.as_deref(),
            )
            .context("enqueue kernel")?;
        if options.wait {
            self.driver.finish(queue).context("finish queue")?;
        }
        let kernel_exec = exec_start.elapsed();

        for lease in leases {
            if options.wait {
                lease.complete()?;
            } else {
                lease.release()?;
            }
        }

        let timings = RunTimings {
            data_to_kernel,
            kernel_exec,
            total: start.elapsed(),
        };
        info!(
            "[cl-memory] kernel {} ran over {:?} on {} in {:?}",
            kernel.0, options.global_work, queue, timings.total
        );
        Ok(timings)
    }
}

/// Bind through an existing lease when the allocation already appears in
/// an earlier slot
fn bind_reusing<'a>(
    binder: &KernelArgumentBinder,
    leases: &mut Vec<DeviceLease<'a>>,
    allocation: &'a MemoryAllocation,
    binding: &SlotBinding,
) -> Result<(), MemoryError> {
    if let Some(lease) = leases
        .iter()
        .find(|lease| lease.allocation().id() == allocation.id())
    {
        debug!(
            "[cl-memory] {} reused for slot {}",
            allocation.id(),
            binding.slot
        );
        return binder.bind_leased(lease, binding);
    }
    leases.push(binder.bind(allocation, binding)?);
    Ok(())
}
