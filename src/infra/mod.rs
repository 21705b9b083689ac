pub mod databus;
