pub mod notedb;
