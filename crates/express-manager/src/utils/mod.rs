pub(crate) mod expiring_cell;
