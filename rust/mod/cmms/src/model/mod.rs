mod loto;
mod permit;
mod work_order;

pub use loto::{EnergyType, LockPoint, Loto, LotoData, LotoStatus, ReleaseRequest};
pub use permit::{CloseRequest, Permit, PermitData, PermitStatus, PermitType, EXPIRABLE};
pub use work_order::{
    CompleteRequest, Priority, StartRequest, WorkOrder, WorkOrderData, WorkOrderStatus,
};
